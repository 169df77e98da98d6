//! `simblock`: a command-line front end for the library. Reads an
//! equation-list file and an endogenous-variable list, builds a [`Model`],
//! solves it against a CSV panel, and writes the solved panel back out.

use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn};

use simblock::{BlockSummary, Model, Panel};

#[derive(Parser, Debug)]
#[command(version, about = "Solve simultaneous systems of lagged algebraic equations", long_about = None)]
struct Args {
    /// Path to a file with one equation per line
    equations_file: String,

    /// Comma-separated list of endogenous variable names
    #[arg(long)]
    endogenous: String,

    /// Path to the input CSV panel (header = column names, rows = periods)
    panel_file: String,

    /// Path to write the solved panel CSV to
    #[arg(long)]
    output: String,

    /// Print the compiled block structure before solving
    #[arg(long, default_value_t = false)]
    show_blocks: bool,

    /// Override the default Newton-Raphson convergence tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Override the default Newton-Raphson iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,
}

struct BlockTable<'a>(&'a [BlockSummary]);

impl fmt::Display for BlockTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.0 {
            writeln!(
                f,
                "block {}: endogenous=[{}] exogenous=[{}]",
                block.index,
                block.endogenous.join(", "),
                block.exogenous.join(", ")
            )?;
            for equation in &block.equations {
                writeln!(f, "    {equation}")?;
            }
        }
        Ok(())
    }
}

fn read_equations(path: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("can't read {path}"))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn read_panel(path: &str) -> Result<Panel> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("can't read {path}"))?;
    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("{path} has no header row"))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed record in {path}"))?;
        let row: Vec<f64> = record
            .iter()
            .map(|cell| {
                cell.parse::<f64>()
                    .with_context(|| format!("cell '{cell}' is not a number"))
            })
            .collect::<Result<_>>()?;
        rows.push(row);
    }
    Ok(Panel::from_rows(&columns, rows)?)
}

fn write_panel(path: &str, panel: &Panel) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("can't write {path}"))?;
    let columns: Vec<&str> = panel.column_names().collect();
    writer.write_record(&columns)?;
    for row in 0..panel.nrows() {
        let record: Vec<String> = columns
            .iter()
            .map(|name| panel.get(row, name).unwrap_or(f64::NAN).to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    debug!("env logger started");
    let args = Args::parse();

    let equations = read_equations(&args.equations_file)?;
    let endogenous: Vec<String> = args
        .endogenous
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let model = Model::build(&equations, &endogenous)?;
    debug!(
        "compiled {} blocks, max_lag={}",
        model.blocks().len(),
        model.max_lag()
    );

    if args.tolerance.is_some() || args.max_iterations.is_some() {
        model.configure(|c| {
            if let Some(tolerance) = args.tolerance {
                c.set_root_tolerance(tolerance)?;
            }
            if let Some(max_iterations) = args.max_iterations {
                c.set_max_iterations(max_iterations)?;
            }
            Ok(())
        })?;
    }

    if args.show_blocks {
        print!("{}", BlockTable(&model.blocks()));
    }

    let mut panel = read_panel(&args.panel_file)?;
    let diagnostics = model.solve(&mut panel)?;
    for diagnostic in &diagnostics {
        warn!(
            "block {} at period {}: {:?}",
            diagnostic.block, diagnostic.period, diagnostic.kind
        );
    }

    write_panel(&args.output, &panel)?;
    Ok(())
}
