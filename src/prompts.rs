//! The instructional prompt sent with every analysis request.
//!
//! The prompt fixes the JSON schema that [`crate::record::AnalysisRecord`]
//! mirrors; change both together. Only two things vary per request: the
//! number of uploaded files and the agent's free-text notes, which are
//! embedded verbatim.

/// Opening sentence; `{file_count}` is substituted.
const PROMPT_OPENING: &str =
    "I need you to create a comprehensive CMA for this property. I've uploaded {file_count} files.";

/// Header placed above the agent's notes when notes are present.
const NOTES_HEADER: &str = "ADDITIONAL CONTEXT FROM AGENT:";

/// The analysis steps and the output schema.
pub const ANALYSIS_INSTRUCTIONS: &str = r#"Please complete the following analysis:

STEP 1: VERIFY PROPERTY DATA
- If tax records are provided, automatically cross-reference bed/bath/sqft with Zillow, Realtor.com
- Only flag discrepancies - show comparison data if something doesn't match

STEP 2: ANALYZE COMPARABLES
- Read ALL property descriptions carefully in the "Agent Condensed" PDF
- Pay attention to condition, updates, lot characteristics
- Check for seller concessions and adjust prices accordingly

STEP 3: WEIGHT AND SCALE COMPS
- Give more weight to closer matches in sqft, condition, location
- Downweight properties that differ significantly

STEP 4: PRICING ANALYSIS
- Provide recommended list price with rationale
- Include price per square foot analysis
- Show expected sale price range and timeline
- Calculate net proceeds

STEP 5: CREATE AGENT CONTACT TABLE
- Extract agent contact information from "One Line CMA"
- Include: Address, Sale Price, CDOM, Agent Name, Brokerage, Phone, Email

STEP 6: FORMAT OUTPUT
Please structure your response as JSON with these sections:
{
  "propertyAddress": "address",
  "recommendedPrice": 650000,
  "priceRange": { "low": 635000, "high": 675000 },
  "pricePerSF": 195,
  "netProceeds": 580000,
  "daysOnMarket": 45,
  "activeCompetition": [
    { "address": "", "listPrice": 0, "pricePerSF": 0, "bedBath": "", "sqft": 0, "year": 0, "dom": 0 }
  ],
  "recentSales": [
    { "address": "", "soldPrice": 0, "pricePerSF": 0, "bedBath": "", "sqft": 0, "year": 0, "saleDate": "", "concessions": 0 }
  ],
  "topComps": [
    { "address": "", "soldPrice": 0, "details": "detailed analysis", "reason": "why this comp is relevant" }
  ],
  "agentContacts": [
    { "address": "", "price": 0, "cdom": 0, "agent": "", "brokerage": "", "phone": "", "email": "" }
  ],
  "marketInsights": ["insight 1", "insight 2"],
  "investmentAnalysis": {
    "purchasePrice": 0,
    "downPayment": 0,
    "projectedProceeds": 0,
    "totalProfit": 0,
    "cashOnCashReturn": "865%",
    "annualizedReturn": "91%"
  }
}

Return ONLY the JSON, no other text."#;

/// Build the full prompt for a request.
///
/// Empty notes are treated as absent, so the notes header never appears
/// with nothing under it.
pub fn build_analysis_prompt(file_count: usize, notes: Option<&str>) -> String {
    let mut prompt = PROMPT_OPENING.replace("{file_count}", &file_count.to_string());

    if let Some(notes) = notes.filter(|n| !n.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(NOTES_HEADER);
        prompt.push('\n');
        prompt.push_str(notes);
        prompt.push('\n');
    }

    prompt.push_str("\n\n");
    prompt.push_str(ANALYSIS_INSTRUCTIONS);
    prompt
}
