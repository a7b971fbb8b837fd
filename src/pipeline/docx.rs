//! Document assembly: [`ReportLayout`] → `.docx` bytes.
//!
//! Page setup and styling live here and nowhere else:
//!
//! | Element | Setting |
//! |---------|---------|
//! | Page | US Letter (12240 × 15840 twips), 1-inch margins |
//! | Body text | Arial 12 pt |
//! | Heading 1 | 16 pt bold, 240 twips before and after, outline level 0 |
//! | Heading 2 | 14 pt bold, 180 twips before and after, outline level 1 |
//! | Cell borders | single, size 1, `CCCCCC`, on every cell |
//! | Callouts | single shaded cell, full content width, 120-twip margins |
//! | Tables | blue header row with white bold labels, fixed column widths |
//!
//! Packing is purely in-memory; nothing touches the file system.

use crate::error::CmaError;
use crate::pipeline::layout::{
    Block, Callout, DataTable, ReportLayout, CONTENT_WIDTH, HEADER_FILL, HEADER_TEXT_COLOR,
};
use docx_rs::{
    AlignmentType, BorderType, CellMargins, Docx, LineSpacing, PageMargin, Paragraph, Run,
    RunFonts, Shading, Style, StyleType, Table, TableCell, TableCellBorder,
    TableCellBorderPosition, TableCellBorders, TableRow, WidthType,
};
use std::io::Cursor;
use tracing::debug;

/// MIME type of the produced document.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const FONT: &str = "Arial";
const HEADING1: &str = "Heading1";
const HEADING2: &str = "Heading2";
const BORDER_COLOR: &str = "CCCCCC";
const CALLOUT_MARGIN: usize = 120;

/// Serialize a layout into a complete `.docx` package.
pub fn pack_report(layout: &ReportLayout) -> Result<Vec<u8>, CmaError> {
    let mut doc = base_document();

    for block in &layout.blocks {
        doc = match block {
            Block::Title(text) => doc.add_paragraph(
                Paragraph::new()
                    .style(HEADING1)
                    .align(AlignmentType::Center)
                    .add_run(Run::new().add_text(text.as_str()).bold()),
            ),
            Block::Subtitle(text) => doc.add_paragraph(
                Paragraph::new()
                    .align(AlignmentType::Center)
                    .add_run(Run::new().add_text(text.as_str())),
            ),
            Block::Heading(text) => doc.add_paragraph(
                Paragraph::new()
                    .style(HEADING2)
                    .add_run(Run::new().add_text(text.as_str()).bold()),
            ),
            Block::Callout(callout) => doc.add_table(callout_table(callout)),
            Block::Table(table) => doc.add_table(data_table(table)),
            Block::Bullet(text) => {
                doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(text.as_str())))
            }
            Block::Spacer => doc.add_paragraph(Paragraph::new()),
        };
    }

    let mut buf = Vec::new();
    doc.build()
        .pack(Cursor::new(&mut buf))
        .map_err(|e| CmaError::RenderFailed(e.to_string()))?;
    debug!("Packed report: {} blocks → {} bytes", layout.blocks.len(), buf.len());
    Ok(buf)
}

fn base_document() -> Docx {
    Docx::new()
        .page_size(12240, 15840)
        .page_margin(
            PageMargin::new()
                .top(1440)
                .bottom(1440)
                .left(1440)
                .right(1440),
        )
        .default_fonts(RunFonts::new().ascii(FONT).hi_ansi(FONT).cs(FONT))
        .default_size(24)
        .add_style(heading_style(HEADING1, "Heading 1", 32, 240, 0))
        .add_style(heading_style(HEADING2, "Heading 2", 28, 180, 1))
}

fn heading_style(id: &str, name: &str, half_points: usize, spacing: u32, level: usize) -> Style {
    Style::new(id, StyleType::Paragraph)
        .name(name)
        .based_on("Normal")
        .next("Normal")
        .size(half_points)
        .bold()
        .line_spacing(LineSpacing::new().before(spacing).after(spacing))
        .outline_lvl(level)
}

/// A bordered cell of the given width.
fn cell(width: usize) -> TableCell {
    let borders = [
        TableCellBorderPosition::Top,
        TableCellBorderPosition::Left,
        TableCellBorderPosition::Bottom,
        TableCellBorderPosition::Right,
    ]
    .into_iter()
    .fold(TableCellBorders::with_empty(), |borders, position| {
        borders.set(
            TableCellBorder::new(position)
                .border_type(BorderType::Single)
                .size(1)
                .color(BORDER_COLOR),
        )
    });
    TableCell::new()
        .width(width, WidthType::Dxa)
        .set_borders(borders)
}

fn callout_table(callout: &Callout) -> Table {
    let mut body = cell(CONTENT_WIDTH).shading(Shading::new().fill(callout.fill));
    body.property = body.property.margins(
        CellMargins::new()
            .margin_top(CALLOUT_MARGIN, WidthType::Dxa)
            .margin_right(CALLOUT_MARGIN, WidthType::Dxa)
            .margin_bottom(CALLOUT_MARGIN, WidthType::Dxa)
            .margin_left(CALLOUT_MARGIN, WidthType::Dxa),
    );
    for line in &callout.lines {
        let mut run = Run::new().add_text(line.text.as_str());
        if line.bold {
            run = run.bold();
        }
        body = body.add_paragraph(Paragraph::new().add_run(run));
    }

    Table::new(vec![TableRow::new(vec![body])])
        .set_grid(vec![CONTENT_WIDTH])
        .width(CONTENT_WIDTH, WidthType::Dxa)
}

fn data_table(table: &DataTable) -> Table {
    let header = TableRow::new(
        table
            .columns
            .iter()
            .map(|column| {
                cell(column.width)
                    .shading(Shading::new().fill(HEADER_FILL))
                    .add_paragraph(
                        Paragraph::new().add_run(
                            Run::new()
                                .add_text(column.label)
                                .bold()
                                .color(HEADER_TEXT_COLOR),
                        ),
                    )
            })
            .collect(),
    );

    let mut rows = Vec::with_capacity(table.row_count());
    rows.push(header);
    for cells in &table.rows {
        rows.push(TableRow::new(
            table
                .columns
                .iter()
                .zip(cells)
                .map(|(column, value)| {
                    cell(column.width)
                        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(value.as_str())))
                })
                .collect(),
        ));
    }

    Table::new(rows)
        .set_grid(table.widths())
        .width(CONTENT_WIDTH, WidthType::Dxa)
}
