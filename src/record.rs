//! The Analysis Record: the JSON object the model returns.
//!
//! Every field is optional. The model is asked for a fixed schema but nothing
//! guarantees it honours it, so the types here are lenient in two ways:
//!
//! * absent and `null` fields both deserialize to `None`, and unknown fields
//!   are ignored;
//! * leaf values are [`Scalar`]s, which accept a JSON number, string or bool.
//!   A model that answers `"recommendedPrice": "$650,000"` still produces a
//!   record; the text is rendered verbatim instead of being formatted.
//!
//! A `null` inside a list is kept as an empty entry: an empty insight bullet
//! or a row with every cell blank. Only structural mismatches (an object
//! where a scalar belongs, a string where a list belongs) are rejected, as
//! [`CmaError::MalformedResponse`].

use crate::error::CmaError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A leaf value as the model sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

/// Parsed model output describing the subject property and its comps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisRecord {
    pub property_address: Option<Scalar>,
    /// Parsed but not rendered; the findings block shows `price_range`.
    pub recommended_price: Option<Scalar>,
    pub price_range: Option<PriceRange>,
    #[serde(rename = "pricePerSF")]
    pub price_per_sf: Option<Scalar>,
    pub net_proceeds: Option<Scalar>,
    pub days_on_market: Option<Scalar>,
    #[serde(deserialize_with = "null_rows_as_empty")]
    pub active_competition: Option<Vec<ActiveListing>>,
    #[serde(deserialize_with = "null_rows_as_empty")]
    pub recent_sales: Option<Vec<RecentSale>>,
    /// Reserved: requested from the model, never rendered.
    #[serde(deserialize_with = "null_rows_as_empty")]
    pub top_comps: Option<Vec<TopComp>>,
    #[serde(deserialize_with = "null_rows_as_empty")]
    pub agent_contacts: Option<Vec<AgentContact>>,
    /// `None` entries render as empty bullets.
    pub market_insights: Option<Vec<Option<Scalar>>>,
    pub investment_analysis: Option<InvestmentAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRange {
    pub low: Option<Scalar>,
    pub high: Option<Scalar>,
}

/// A currently listed competing property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveListing {
    pub address: Option<Scalar>,
    pub list_price: Option<Scalar>,
    #[serde(rename = "pricePerSF")]
    pub price_per_sf: Option<Scalar>,
    pub bed_bath: Option<Scalar>,
    pub sqft: Option<Scalar>,
    pub year: Option<Scalar>,
    pub dom: Option<Scalar>,
}

/// A closed sale used as a comp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentSale {
    pub address: Option<Scalar>,
    pub sold_price: Option<Scalar>,
    #[serde(rename = "pricePerSF")]
    pub price_per_sf: Option<Scalar>,
    pub bed_bath: Option<Scalar>,
    pub sqft: Option<Scalar>,
    pub year: Option<Scalar>,
    pub sale_date: Option<Scalar>,
    pub concessions: Option<Scalar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopComp {
    pub address: Option<Scalar>,
    pub sold_price: Option<Scalar>,
    pub details: Option<Scalar>,
    pub reason: Option<Scalar>,
}

/// Listing agent details for follow-up calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentContact {
    pub address: Option<Scalar>,
    pub price: Option<Scalar>,
    pub cdom: Option<Scalar>,
    pub agent: Option<Scalar>,
    pub brokerage: Option<Scalar>,
    pub phone: Option<Scalar>,
    pub email: Option<Scalar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvestmentAnalysis {
    pub purchase_price: Option<Scalar>,
    pub down_payment: Option<Scalar>,
    pub projected_proceeds: Option<Scalar>,
    pub total_profit: Option<Scalar>,
    pub cash_on_cash_return: Option<Scalar>,
    pub annualized_return: Option<Scalar>,
}

impl AnalysisRecord {
    /// Convert an already-parsed JSON value into a record.
    ///
    /// The top level must be an object; arrays, strings and numbers are
    /// rejected even though they are valid JSON.
    pub fn from_value(value: Value) -> Result<Self, CmaError> {
        if !value.is_object() {
            return Err(CmaError::MalformedResponse {
                detail: format!("expected a JSON object, got {}", json_type_name(&value)),
            });
        }
        serde_json::from_value(value).map_err(|e| CmaError::MalformedResponse {
            detail: e.to_string(),
        })
    }
}

/// Deserialize a list of rows, turning `null` elements into blank rows.
fn null_rows_as_empty<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let rows: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(rows.map(|rows| rows.into_iter().map(Option::unwrap_or_default).collect()))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_is_an_empty_record() {
        let record = AnalysisRecord::from_value(json!({})).unwrap();
        assert_eq!(record, AnalysisRecord::default());
    }

    #[test]
    fn camel_case_and_sf_fields_map() {
        let record = AnalysisRecord::from_value(json!({
            "propertyAddress": "12 Elm St",
            "pricePerSF": 195,
            "daysOnMarket": 45,
            "priceRange": { "low": 635000, "high": 675000 },
            "activeCompetition": [{ "listPrice": 640000, "pricePerSF": 201.5, "dom": 12 }]
        }))
        .unwrap();

        assert_eq!(record.property_address, Some(Scalar::from("12 Elm St")));
        assert_eq!(record.price_per_sf, Some(Scalar::Number(195.0)));
        let range = record.price_range.unwrap();
        assert_eq!(range.low.and_then(|s| s.as_f64()), Some(635000.0));
        let active = record.active_competition.unwrap();
        assert_eq!(active[0].price_per_sf, Some(Scalar::Number(201.5)));
        assert_eq!(active[0].address, None);
    }

    #[test]
    fn nulls_and_unknown_fields_are_tolerated() {
        let record = AnalysisRecord::from_value(json!({
            "recentSales": null,
            "netProceeds": null,
            "somethingNew": { "nested": true }
        }))
        .unwrap();
        assert!(record.recent_sales.is_none());
        assert!(record.net_proceeds.is_none());
    }

    #[test]
    fn numbers_sent_as_text_are_kept() {
        let record = AnalysisRecord::from_value(json!({ "netProceeds": "$580,000" })).unwrap();
        assert_eq!(record.net_proceeds, Some(Scalar::from("$580,000")));
    }

    #[test]
    fn non_object_top_level_is_malformed() {
        let err = AnalysisRecord::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CmaError::MalformedResponse { .. }));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn structural_mismatch_is_malformed() {
        let err = AnalysisRecord::from_value(json!({ "activeCompetition": "none" })).unwrap_err();
        assert!(matches!(err, CmaError::MalformedResponse { .. }));
    }

    #[test]
    fn null_insight_is_kept_as_an_empty_entry() {
        let record = AnalysisRecord::from_value(json!({ "marketInsights": ["a", null, "b"] }))
            .unwrap();
        assert_eq!(
            record.market_insights,
            Some(vec![Some(Scalar::from("a")), None, Some(Scalar::from("b"))])
        );
    }

    #[test]
    fn null_row_becomes_a_blank_row() {
        let record = AnalysisRecord::from_value(json!({
            "activeCompetition": [null, { "address": "12 Oak St", "listPrice": 649000 }],
            "agentContacts": [null]
        }))
        .unwrap();
        let rows = record.active_competition.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ActiveListing::default());
        assert_eq!(rows[1].address, Some(Scalar::from("12 Oak St")));
        assert_eq!(record.agent_contacts, Some(vec![AgentContact::default()]));
    }

    #[test]
    fn top_comps_survive_parsing() {
        let record = AnalysisRecord::from_value(json!({
            "topComps": [{ "address": "1 Oak", "soldPrice": 600000, "details": "d", "reason": "r" }]
        }))
        .unwrap();
        assert_eq!(record.top_comps.map(|c| c.len()), Some(1));
    }
}
