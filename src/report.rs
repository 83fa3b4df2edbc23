//! Report workbooks and the sheet layouts each test writes into them.
//!
//! A [`Workbook`] is a set of named sheets addressed by `(row, col)`. The
//! layout functions below decide what goes where; the workbook only stores
//! cells and renders them when closed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, SweepError};
use crate::sweep::{ConversionRow, Direction, Oip3Row, P1dbTrace};

pub const NOT_FOUND: &str = "Not found";

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(number) => Cell::Number(number),
            None => Cell::Text(NOT_FOUND.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SheetId(usize);

/// A named grid of cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(usize, usize), Cell>,
}

impl Sheet {
    fn new(name: &str) -> Sheet {
        Sheet {
            name: name.to_string(),
            cells: BTreeMap::new(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        match self.cell(row, col) {
            Some(Cell::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        match self.cell(row, col) {
            Some(Cell::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Number of rows up to the last written one.
    pub fn row_count(&self) -> usize {
        self.cells.keys().map(|(row, _)| row + 1).max().unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.cells.keys().map(|(_, col)| col + 1).max().unwrap_or(0)
    }
}

/// Destination for measurement sheets.
///
/// `close` consumes the workbook so it can only happen once.
pub trait Workbook {
    type Output;

    fn add_sheet(&mut self, name: &str) -> Result<SheetId>;
    fn write_cell(&mut self, sheet: SheetId, row: usize, col: usize, cell: Cell) -> Result<()>;
    fn close(self) -> Result<Self::Output>;
}

// Sheet bookkeeping shared by the workbook implementations.
#[derive(Debug, Default)]
struct Sheets(Vec<Sheet>);

impl Sheets {
    fn add(&mut self, name: &str) -> Result<SheetId> {
        if name.is_empty() {
            return Err(SweepError::invalid("sheet name is empty"));
        }
        if self.0.iter().any(|sheet| sheet.name == name) {
            return Err(SweepError::invalid(format!("sheet {:?} already exists", name)));
        }
        self.0.push(Sheet::new(name));
        Ok(SheetId(self.0.len() - 1))
    }

    fn write(&mut self, sheet: SheetId, row: usize, col: usize, cell: Cell) -> Result<()> {
        let target = self
            .0
            .get_mut(sheet.0)
            .ok_or_else(|| SweepError::invalid(format!("no sheet with id {}", sheet.0)))?;
        target.cells.insert((row, col), cell);
        Ok(())
    }
}

/// Keeps every sheet in memory; closing hands them back.
#[derive(Debug, Default)]
pub struct MemoryWorkbook {
    sheets: Sheets,
}

impl MemoryWorkbook {
    pub fn new() -> MemoryWorkbook {
        MemoryWorkbook::default()
    }
}

impl Workbook for MemoryWorkbook {
    type Output = Vec<Sheet>;

    fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        self.sheets.add(name)
    }

    fn write_cell(&mut self, sheet: SheetId, row: usize, col: usize, cell: Cell) -> Result<()> {
        self.sheets.write(sheet, row, col, cell)
    }

    fn close(self) -> Result<Vec<Sheet>> {
        Ok(self.sheets.0)
    }
}

/// Writes one HTML table per sheet when closed.
#[derive(Debug)]
pub struct HtmlWorkbook {
    path: PathBuf,
    title: String,
    sheets: Sheets,
}

impl HtmlWorkbook {
    pub fn new(path: impl AsRef<Path>, title: &str) -> HtmlWorkbook {
        HtmlWorkbook {
            path: path.as_ref().to_path_buf(),
            title: title.to_string(),
            sheets: Sheets::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Workbook for HtmlWorkbook {
    type Output = PathBuf;

    fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        self.sheets.add(name)
    }

    fn write_cell(&mut self, sheet: SheetId, row: usize, col: usize, cell: Cell) -> Result<()> {
        self.sheets.write(sheet, row, col, cell)
    }

    fn close(self) -> Result<PathBuf> {
        let mut file = BufWriter::new(File::create(&self.path)?);
        write_html(&mut file, &self.title, &self.sheets.0)?;
        file.flush()?;
        info!(path = %self.path.display(), sheets = self.sheets.0.len(), "report written");
        Ok(self.path)
    }
}

fn write_html(file: &mut impl Write, title: &str, sheets: &[Sheet]) -> std::io::Result<()> {
    writeln!(file, "<!DOCTYPE html>")?;
    writeln!(file, "<html>")?;
    writeln!(file, "<head>")?;
    writeln!(file, "<title>{}</title>", escape(title))?;
    writeln!(file, "<style>")?;
    writeln!(file, "table {{ border-collapse: collapse; }}")?;
    writeln!(
        file,
        "th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}"
    )?;
    writeln!(file, "th {{ background-color: #f2f2f2; }}")?;
    writeln!(file, "tr:nth-child(even) {{ background-color: #f9f9f9; }}")?;
    writeln!(file, "</style>")?;
    writeln!(file, "</head>")?;
    writeln!(file, "<body>")?;
    writeln!(file, "<h1>{}</h1>", escape(title))?;

    for sheet in sheets {
        writeln!(file, "<h2>{}</h2>", escape(&sheet.name))?;
        writeln!(file, "<table class=\"sheet\">")?;
        for row in 0..sheet.row_count() {
            writeln!(file, "<tr>")?;
            for col in 0..sheet.column_count() {
                match sheet.cell(row, col) {
                    Some(Cell::Number(value)) => writeln!(file, "<td>{}</td>", value)?,
                    Some(Cell::Text(text)) => writeln!(file, "<td>{}</td>", escape(text))?,
                    None => writeln!(file, "<td></td>")?,
                }
            }
            writeln!(file, "</tr>")?;
        }
        writeln!(file, "</table>")?;
        writeln!(file, "<br>")?;
    }

    writeln!(file, "</body>")?;
    writeln!(file, "</html>")?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn write_row<W: Workbook + ?Sized>(
    workbook: &mut W,
    sheet: SheetId,
    row: usize,
    cells: Vec<Cell>,
) -> Result<()> {
    for (col, cell) in cells.into_iter().enumerate() {
        workbook.write_cell(sheet, row, col, cell)?;
    }
    Ok(())
}

fn sheet_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Transmit => "Up_Conversion",
        Direction::Receive => "Down_Conversion",
    }
}

/// The `Notes` sheet: creation time, free-form notes and the report name.
pub fn write_notes<W: Workbook + ?Sized>(
    workbook: &mut W,
    created: &str,
    notes: &str,
    report_name: &str,
) -> Result<SheetId> {
    let sheet = workbook.add_sheet("Notes")?;
    write_row(workbook, sheet, 0, vec!["Date Time".into(), created.into()])?;
    write_row(workbook, sheet, 1, vec!["Test Notes".into(), notes.into()])?;
    write_row(workbook, sheet, 2, vec!["Spreadsheet Name".into(), report_name.into()])?;
    Ok(sheet)
}

pub fn write_conversion_sheet<W: Workbook + ?Sized>(
    workbook: &mut W,
    direction: Direction,
    rows: &[ConversionRow],
) -> Result<SheetId> {
    let sheet = workbook.add_sheet(sheet_prefix(direction))?;
    let header = vec![
        "IF Frequency (GHz)".into(),
        "LO Frequency (GHz)".into(),
        "RF Frequency (GHz)".into(),
        "Specan Raw Pin (dBm)".into(),
        format!("Eval Board {} Pout (dBm)", direction.measured_port()).into(),
        format!("Eval Board {} Pin (dBm)", direction.stimulus_port()).into(),
        "Eval Board LO Pin (dBm)".into(),
        "Eval Board Conversion Gain (dB)".into(),
    ];
    write_row(workbook, sheet, 0, header)?;

    for (i, row) in rows.iter().enumerate() {
        let cells = vec![
            row.point.if_ghz.into(),
            row.point.lo_ghz.into(),
            row.point.rf_ghz.into(),
            row.raw_dbm.into(),
            row.output_dbm.into(),
            row.input_dbm.into(),
            row.lo_dbm.into(),
            row.gain_db.into(),
        ];
        write_row(workbook, sheet, i + 1, cells)?;
    }
    debug!(sheet = sheet_prefix(direction), rows = rows.len(), "conversion sheet written");
    Ok(sheet)
}

/// Compensated and raw compression sheets, one column per frequency
/// combination, followed by the IP1dB and OP1dB rows.
pub fn write_p1db_sheets<W: Workbook + ?Sized>(
    workbook: &mut W,
    direction: Direction,
    traces: &[P1dbTrace],
) -> Result<(SheetId, SheetId)> {
    let prefix = sheet_prefix(direction);
    let compensated = workbook.add_sheet(&format!("{}_OP1dB", prefix))?;
    let raw = workbook.add_sheet(&format!("{}_OP1dB_Raw", prefix))?;

    let input_header = format!("{} Pin (dBm)", direction.stimulus_port());
    workbook.write_cell(compensated, 0, 0, input_header.clone().into())?;
    workbook.write_cell(raw, 0, 0, input_header.into())?;

    for (i, trace) in traces.iter().enumerate() {
        let col = i + 1;
        let point = &trace.point;
        let frequencies = format!(
            "RF {}GHz, LO {}GHz, IF {}GHz",
            point.rf_ghz, point.lo_ghz, point.if_ghz
        );
        workbook.write_cell(compensated, 0, col, format!("Pout(dBm), {}", frequencies).into())?;
        workbook.write_cell(raw, 0, col, format!("Pout_raw(dBm), {}", frequencies).into())?;

        let output_dbm = trace.compensated_dbm();
        for (k, (&input, &raw_dbm)) in trace.input_dbm.iter().zip(&trace.raw_dbm).enumerate() {
            let row = k + 1;
            workbook.write_cell(compensated, row, 0, input.into())?;
            workbook.write_cell(compensated, row, col, output_dbm[k].into())?;
            workbook.write_cell(raw, row, 0, input.into())?;
            workbook.write_cell(raw, row, col, raw_dbm.into())?;
        }

        let ip1db_row = trace.raw_dbm.len() + 1;
        for sheet in [compensated, raw] {
            workbook.write_cell(sheet, ip1db_row, 0, "IP1dB (dBm)".into())?;
            workbook.write_cell(sheet, ip1db_row, col, trace.input_p1db().into())?;
            workbook.write_cell(sheet, ip1db_row + 1, 0, "OP1dB (dBm)".into())?;
        }
        workbook.write_cell(compensated, ip1db_row + 1, col, trace.output_p1db().into())?;
        workbook.write_cell(raw, ip1db_row + 1, col, trace.raw_output_p1db().into())?;
    }
    Ok((compensated, raw))
}

pub fn write_oip3_sheet<W: Workbook + ?Sized>(
    workbook: &mut W,
    direction: Direction,
    device: &str,
    rows: &[Oip3Row],
) -> Result<SheetId> {
    let sheet = workbook.add_sheet(&format!("{}_IP3", sheet_prefix(direction)))?;
    let label = format!("{} {}", device, direction);
    let header = vec![
        "IF Frequency (GHz)".into(),
        "LO Frequency (GHz)".into(),
        "RF Frequency (GHz)".into(),
        "IM Tone Separation (MHz)".into(),
        "Low IM Tone Pout (dBm)".into(),
        "Low Main Tone Pout (dBm)".into(),
        "High Main Tone Pout (dBm)".into(),
        "High IM Tone Pout (dBm)".into(),
        format!("{} Low OIP3 (dBm)", label).into(),
        format!("{} High OIP3 (dBm)", label).into(),
        format!("{} Average OIP3 (dBm)", label).into(),
        format!("{} Conversion Gain Low Tone (dB)", label).into(),
        format!("{} Conversion Gain High Tone (dB)", label).into(),
    ];
    write_row(workbook, sheet, 0, header)?;

    for (i, row) in rows.iter().enumerate() {
        let tones = row.compensated();
        let cells = vec![
            row.point.if_ghz.into(),
            row.point.lo_ghz.into(),
            row.point.rf_ghz.into(),
            row.tone_separation_mhz.into(),
            tones.im_low.into(),
            tones.tone_low.into(),
            tones.tone_high.into(),
            tones.im_high.into(),
            row.result.low_oip3.into(),
            row.result.high_oip3.into(),
            row.result.average_oip3.into(),
            row.result.low_tone_gain.into(),
            row.result.high_tone_gain.into(),
        ];
        write_row(workbook, sheet, i + 1, cells)?;
    }
    Ok(sheet)
}
