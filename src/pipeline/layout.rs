//! Report layout: Analysis Record → ordered blocks.
//!
//! Building the report happens in two passes. This module decides *what*
//! the report says: which sections appear, in which order, and the exact
//! text of every line and cell. [`crate::pipeline::docx`] then decides *how*
//! it looks on the page. Keeping the passes apart lets the content rules be
//! tested on plain Rust values instead of unzipped WordprocessingML.
//!
//! ## Section order
//!
//! ```text
//! title + address                      always
//! Your Investment Performance          only with investmentAnalysis
//! Key Market Findings                  always
//! Active Competition                   only with ≥ 1 listing
//! Recent Sales                         only with ≥ 1 sale
//! Agent Contacts for Follow-Up         only with ≥ 1 contact
//! Market Insights                      only with ≥ 1 insight
//! ```
//!
//! Rows keep the order the model gave them. Nothing is sorted, filtered or
//! deduplicated.

use crate::pipeline::format::{currency, grouped, plain, text};
use crate::record::{ActiveListing, AgentContact, AnalysisRecord, InvestmentAnalysis, RecentSale};

/// Usable width between the 1-inch margins of a Letter page, in twips.
pub const CONTENT_WIDTH: usize = 9360;

pub const INVESTMENT_FILL: &str = "D5E8F0";
pub const FINDINGS_FILL: &str = "FFF4CC";
pub const HEADER_FILL: &str = "4472C4";
pub const HEADER_TEXT_COLOR: &str = "FFFFFF";

pub const REPORT_TITLE: &str = "Comparative Market Analysis";
pub const ADDRESS_FALLBACK: &str = "Property Address";

pub const INVESTMENT_HEADING: &str = "Your Investment Performance";
pub const FINDINGS_HEADING: &str = "Key Market Findings";
pub const ACTIVE_HEADING: &str = "Active Competition";
pub const SALES_HEADING: &str = "Recent Sales";
pub const AGENTS_HEADING: &str = "Agent Contacts for Follow-Up";
pub const INSIGHTS_HEADING: &str = "Market Insights";

/// A table column: header label and width in twips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub label: &'static str,
    pub width: usize,
}

const fn col(label: &'static str, width: usize) -> Column {
    Column { label, width }
}

pub static ACTIVE_COLUMNS: [Column; 7] = [
    col("Address", 2000),
    col("List Price", 1500),
    col("$/SF", 1000),
    col("Bed/Bath", 1200),
    col("Sq Ft", 1200),
    col("Year", 1000),
    col("DOM", 1460),
];

pub static SALES_COLUMNS: [Column; 7] = [
    col("Address", 2000),
    col("Sold Price", 1500),
    col("$/SF", 1000),
    col("Bed/Bath", 1200),
    col("Sq Ft", 1200),
    col("Year", 1000),
    col("Sale Date", 1460),
];

pub static AGENT_COLUMNS: [Column; 7] = [
    col("Address", 1800),
    col("Price", 1200),
    col("CDOM", 800),
    col("Agent", 1500),
    col("Brokerage", 1500),
    col("Phone", 1200),
    col("Email", 1360),
];

/// One line of text inside a callout box.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub bold: bool,
}

impl Line {
    fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

/// A single-cell shaded box holding a few lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Callout {
    pub fill: &'static str,
    pub lines: Vec<Line>,
}

/// A header row plus data rows. Every data row has one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub columns: &'static [Column],
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Rows including the header row.
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }

    pub fn header_labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.label).collect()
    }

    pub fn widths(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.width).collect()
    }
}

/// One element of the report body, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Heading 1, centred.
    Title(String),
    /// Centred body line under the title.
    Subtitle(String),
    /// Heading 2 introducing a section.
    Heading(String),
    Callout(Callout),
    Table(DataTable),
    /// A `• ` prefixed line.
    Bullet(String),
    /// Empty paragraph separating sections.
    Spacer,
}

/// The whole report as ordered blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportLayout {
    pub blocks: Vec<Block>,
}

impl ReportLayout {
    /// Section headings in document order.
    pub fn headings(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading(h) => Some(h.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The first table following the given heading, if that section exists.
    pub fn table_after(&self, heading: &str) -> Option<&DataTable> {
        let start = self
            .blocks
            .iter()
            .position(|b| matches!(b, Block::Heading(h) if h == heading))?;
        self.blocks[start + 1..].iter().find_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    /// The first callout following the given heading.
    pub fn callout_after(&self, heading: &str) -> Option<&Callout> {
        let start = self
            .blocks
            .iter()
            .position(|b| matches!(b, Block::Heading(h) if h == heading))?;
        self.blocks[start + 1..].iter().find_map(|b| match b {
            Block::Callout(c) => Some(c),
            _ => None,
        })
    }

    /// Every visible string, one per line, in document order.
    pub fn plain_text(&self) -> String {
        let mut out = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Title(s) | Block::Subtitle(s) | Block::Heading(s) | Block::Bullet(s) => {
                    out.push(s.clone())
                }
                Block::Callout(c) => out.extend(c.lines.iter().map(|l| l.text.clone())),
                Block::Table(t) => {
                    out.push(t.header_labels().join(" | "));
                    out.extend(t.rows.iter().map(|r| r.join(" | ")));
                }
                Block::Spacer => out.push(String::new()),
            }
        }
        out.join("\n")
    }
}

/// Lay out the full report for a record.
pub fn build_layout(record: &AnalysisRecord) -> ReportLayout {
    let mut blocks = Vec::new();

    blocks.push(Block::Title(REPORT_TITLE.to_string()));
    let address = text(record.property_address.as_ref());
    blocks.push(Block::Subtitle(if address.is_empty() {
        ADDRESS_FALLBACK.to_string()
    } else {
        address
    }));
    blocks.push(Block::Spacer);

    if let Some(inv) = &record.investment_analysis {
        blocks.push(Block::Heading(INVESTMENT_HEADING.to_string()));
        blocks.push(Block::Callout(investment_callout(inv)));
        blocks.push(Block::Spacer);
    }

    blocks.push(Block::Heading(FINDINGS_HEADING.to_string()));
    blocks.push(Block::Callout(findings_callout(record)));
    blocks.push(Block::Spacer);

    if let Some(listings) = non_empty(&record.active_competition) {
        blocks.push(Block::Heading(ACTIVE_HEADING.to_string()));
        blocks.push(Block::Table(DataTable {
            columns: &ACTIVE_COLUMNS,
            rows: listings.iter().map(active_row).collect(),
        }));
        blocks.push(Block::Spacer);
    }

    if let Some(sales) = non_empty(&record.recent_sales) {
        blocks.push(Block::Heading(SALES_HEADING.to_string()));
        blocks.push(Block::Table(DataTable {
            columns: &SALES_COLUMNS,
            rows: sales.iter().map(sale_row).collect(),
        }));
        blocks.push(Block::Spacer);
    }

    if let Some(contacts) = non_empty(&record.agent_contacts) {
        blocks.push(Block::Heading(AGENTS_HEADING.to_string()));
        blocks.push(Block::Table(DataTable {
            columns: &AGENT_COLUMNS,
            rows: contacts.iter().map(agent_row).collect(),
        }));
        blocks.push(Block::Spacer);
    }

    if let Some(insights) = non_empty(&record.market_insights) {
        blocks.push(Block::Heading(INSIGHTS_HEADING.to_string()));
        for insight in insights {
            blocks.push(Block::Bullet(format!("• {}", text(insight.as_ref()))));
        }
    }

    ReportLayout { blocks }
}

fn non_empty<T>(items: &Option<Vec<T>>) -> Option<&[T]> {
    items.as_deref().filter(|v| !v.is_empty())
}

fn investment_callout(inv: &InvestmentAnalysis) -> Callout {
    Callout {
        fill: INVESTMENT_FILL,
        lines: vec![
            Line::bold("Investment Summary"),
            Line::normal(format!(
                "Initial Investment: {}",
                currency(inv.down_payment.as_ref())
            )),
            Line::normal(format!(
                "Projected Net Proceeds: {}",
                currency(inv.projected_proceeds.as_ref())
            )),
            Line::normal(format!(
                "Total Profit: {}",
                currency(inv.total_profit.as_ref())
            )),
            Line::bold(format!(
                "Cash-on-Cash Return: {}",
                text(inv.cash_on_cash_return.as_ref())
            )),
            Line::bold(format!(
                "Annualized Return: {}",
                text(inv.annualized_return.as_ref())
            )),
        ],
    }
}

fn findings_callout(record: &AnalysisRecord) -> Callout {
    let (low, high) = match &record.price_range {
        Some(range) => (range.low.as_ref(), range.high.as_ref()),
        None => (None, None),
    };
    Callout {
        fill: FINDINGS_FILL,
        lines: vec![
            Line::normal(format!(
                "Recommended List Price: {} - {}",
                currency(low),
                currency(high)
            )),
            Line::normal(format!(
                "Price Per Square Foot: ${}",
                plain(record.price_per_sf.as_ref())
            )),
            Line::normal(format!(
                "Expected Days on Market: {} days",
                plain(record.days_on_market.as_ref())
            )),
            Line::normal(format!(
                "Estimated Net Proceeds: {}",
                currency(record.net_proceeds.as_ref())
            )),
        ],
    }
}

fn active_row(l: &ActiveListing) -> Vec<String> {
    vec![
        text(l.address.as_ref()),
        currency(l.list_price.as_ref()),
        format!("${}", plain(l.price_per_sf.as_ref())),
        text(l.bed_bath.as_ref()),
        grouped(l.sqft.as_ref()),
        plain(l.year.as_ref()),
        plain(l.dom.as_ref()),
    ]
}

fn sale_row(s: &RecentSale) -> Vec<String> {
    vec![
        text(s.address.as_ref()),
        currency(s.sold_price.as_ref()),
        format!("${}", plain(s.price_per_sf.as_ref())),
        text(s.bed_bath.as_ref()),
        grouped(s.sqft.as_ref()),
        plain(s.year.as_ref()),
        text(s.sale_date.as_ref()),
    ]
}

fn agent_row(a: &AgentContact) -> Vec<String> {
    vec![
        text(a.address.as_ref()),
        currency(a.price.as_ref()),
        plain(a.cdom.as_ref()),
        text(a.agent.as_ref()),
        text(a.brokerage.as_ref()),
        text(a.phone.as_ref()),
        text(a.email.as_ref()),
    ]
}
