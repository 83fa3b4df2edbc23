use std::fmt;
use std::path::Path;
use std::process;
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::info;

use crate::config::{load_plan, TestPlan};
use crate::error::{Result, SweepError};
use crate::instrument::{prepare_analyzer, Settler, SignalGenerator, ThreadSleep};
use crate::report::{
    write_conversion_sheet, write_notes, write_oip3_sheet, write_p1db_sheets, HtmlWorkbook, Workbook,
};
use crate::simulation::{MixerModel, SimulatedBench};
use crate::sweep::{
    conversion_gain_sweep, oip3_sweep, p1db_sweep, Bench, ConversionSetup, Direction, Oip3Setup,
    P1dbSetup,
};

/// The test to run, named as on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Upconvert,
    Downconvert,
    TxP1db,
    RxP1db,
    TxOip3,
    RxOip3,
}

impl Command {
    pub fn all() -> [Command; 6] {
        [
            Command::Upconvert,
            Command::Downconvert,
            Command::TxP1db,
            Command::RxP1db,
            Command::TxOip3,
            Command::RxOip3,
        ]
    }

    pub fn direction(&self) -> Direction {
        match self {
            Command::Upconvert | Command::TxP1db | Command::TxOip3 => Direction::Transmit,
            Command::Downconvert | Command::RxP1db | Command::RxOip3 => Direction::Receive,
        }
    }

    pub fn is_two_tone(&self) -> bool {
        matches!(self, Command::TxOip3 | Command::RxOip3)
    }
}

impl FromStr for Command {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        Command::all()
            .into_iter()
            .find(|command| command.to_string() == s)
            .ok_or_else(|| {
                let names: Vec<String> = Command::all().iter().map(|c| c.to_string()).collect();
                SweepError::invalid(format!(
                    "unknown test {:?}, expected one of {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Command::Upconvert => "UPCONVERT",
            Command::Downconvert => "DOWNCONVERT",
            Command::TxP1db => "TX_P1DB",
            Command::RxP1db => "RX_P1DB",
            Command::TxOip3 => "TX_OIP3",
            Command::RxOip3 => "RX_OIP3",
        };
        write!(f, "{}", name)
    }
}

// Sweep settings resolved from the plan before anything is written.
enum Prepared {
    Conversion(ConversionSetup),
    P1db(P1dbSetup),
    Oip3(Oip3Setup),
}

fn prepare(plan: &TestPlan, command: Command) -> Result<Prepared> {
    let direction = command.direction();
    Ok(match command {
        Command::Upconvert | Command::Downconvert => {
            Prepared::Conversion(plan.conversion_setup(direction))
        }
        Command::TxP1db | Command::RxP1db => Prepared::P1db(plan.p1db_setup(direction)?),
        Command::TxOip3 | Command::RxOip3 => Prepared::Oip3(plan.oip3_setup(direction)),
    })
}

/// Runs one test against the simulated bench the plan describes and
/// writes its sheets into `workbook`.
///
/// The workbook is closed whether or not the measurement succeeds; a
/// measurement error takes precedence over a close error.
pub fn run_plan<W: Workbook>(
    plan: &TestPlan,
    command: Command,
    mut workbook: W,
    created: &str,
    report_name: &str,
) -> Result<W::Output> {
    let measured = measure(plan, command, &mut workbook, created, report_name);
    let closed = workbook.close();
    measured?;
    closed
}

fn measure<W: Workbook>(
    plan: &TestPlan,
    command: Command,
    workbook: &mut W,
    created: &str,
    report_name: &str,
) -> Result<()> {
    let frequencies = plan.frequency_plan()?;
    let prepared = prepare(plan, command)?;
    let losses = plan.path_losses(command);
    let direction = command.direction();

    write_notes(workbook, created, &plan.notes, report_name)?;

    let model = MixerModel {
        lo_multiplier: plan.lo_multiplier,
        ..plan.simulation.clone()
    };
    let bench = SimulatedBench::new(model);
    let mut stimulus = bench.stimulus_generator("if_rf_mxg");
    let mut second = bench.stimulus_generator("if_rf_mxg2");
    let mut lo = bench.lo_generator("lo_mxg");
    let mut analyzer = bench.analyzer("specan");

    stimulus.turn_off()?;
    lo.turn_off()?;
    prepare_analyzer(&mut analyzer, &plan.analyzer)?;

    let second_tone = if command.is_two_tone() {
        second.turn_off()?;
        Some(&mut second as &mut dyn SignalGenerator)
    } else {
        None
    };
    let mut sleeper = ThreadSleep;
    let mut handles = Bench {
        stimulus: &mut stimulus,
        second_tone,
        lo: &mut lo,
        analyzer: &mut analyzer,
        settler: Settler::new(plan.settle, &mut sleeper),
    };

    info!(%command, device = %plan.device, "running test");
    match prepared {
        Prepared::Conversion(setup) => {
            let rows = conversion_gain_sweep(&mut handles, &frequencies, &setup, &losses)?;
            write_conversion_sheet(workbook, direction, &rows)?;
        }
        Prepared::P1db(setup) => {
            let traces = p1db_sweep(&mut handles, &frequencies, &setup, &losses)?;
            write_p1db_sheets(workbook, direction, &traces)?;
        }
        Prepared::Oip3(setup) => {
            let rows = oip3_sweep(&mut handles, &frequencies, &setup, &losses)?;
            write_oip3_sheet(workbook, direction, &plan.device, &rows)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct Config {
    pub report_path: std::path::PathBuf,
}

impl Config {
    pub fn run(args: &[String]) -> std::result::Result<Config, Box<dyn std::error::Error>> {
        if args.len() < 2 {
            return Err("not enough arguments".into());
        }

        // Check for special flags
        match args[1].as_str() {
            "--version" | "-v" => {
                print_version();
                process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            _ => {}
        }

        if args.len() != 3 {
            return Err(
                "expecting a config path and a test name, such as `conversionsweep plan.toml UPCONVERT`"
                    .into(),
            );
        }

        // unknown tests are rejected before the plan is read
        let command: Command = args[2].parse()?;

        let file_path = &args[1];
        println!("Config Path: {}", file_path);
        let cwd = std::env::current_dir()?;
        let full_path_to_config = cwd.join(file_path);
        println!("Full Path: {}", full_path_to_config.display());
        let plan = load_plan(&full_path_to_config)?;

        let (created, report_name) = report_stamps(&plan.report, chrono::Local::now().naive_local());
        let report_dir = full_path_to_config
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let report_path = report_dir.join(&report_name);

        println!("Running {} on {}", command, plan.device);
        let workbook = HtmlWorkbook::new(&report_path, &format!("{} {}", plan.device, command));
        let report_path = run_plan(&plan, command, workbook, &created, &report_name)?;
        println!("Report written to: {}", report_path.display());

        Ok(Config { report_path })
    }
}

/// Notes-sheet timestamp and report file name for a run started at `at`.
pub fn report_stamps(report: &str, at: NaiveDateTime) -> (String, String) {
    let created = at.format("%Y-%m-%d %H:%M").to_string();
    let report_name = format!("{}_{}.html", report, at.format("%Y-%m-%d_%H-%M"));
    (created, report_name)
}

pub fn print_version() {
    println!("conversionsweep {}", env!("CARGO_PKG_VERSION"));
}

pub fn print_error(error: &str) {
    const RED: &str = "\x1b[31m";
    const RESET: &str = "\x1b[0m";
    println!("{}Problem running test: {error}{}", RED, RESET);
}

pub fn print_help() {
    // ANSI color codes
    const BOLD: &str = "\x1b[1m";
    const CYAN: &str = "\x1b[36m";
    const GREEN: &str = "\x1b[32m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    println!("📡 Mixer conversion gain, P1dB and OIP3 sweeps{}", RESET);
    println!();
    println!("{}{}VERSION:{}", BOLD, YELLOW, RESET);
    println!("    {}{}{}", GREEN, env!("CARGO_PKG_VERSION"), RESET);
    println!();
    println!("{}{}USAGE:{}", BOLD, YELLOW, RESET);
    println!("    {} conversionsweep <CONFIG> <TEST>{}", GREEN, RESET);
    println!();
    println!("     CONFIG: path to a toml test plan");
    println!("     TEST:   one of UPCONVERT, DOWNCONVERT, TX_P1DB, RX_P1DB, TX_OIP3, RX_OIP3");
    println!();
    println!("     The report (html file) is written next to the test plan.");
    println!();
    println!("{}{}OPTIONS:{}", BOLD, YELLOW, RESET);
    println!(
        "    {}  -v, --version{}{}    Print version information",
        GREEN, RESET, RESET
    );
    println!(
        "    {}  -h, --help{}{}       Print help information",
        GREEN, RESET, RESET
    );
    println!();
    println!("{}{}EXAMPLES:{}", BOLD, YELLOW, RESET);
    println!("    {} # Up-conversion gain (Relative path){}", CYAN, RESET);
    println!("    {} conversionsweep files/mamx_011054.toml UPCONVERT{}", GREEN, RESET);
    println!();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::report::{MemoryWorkbook, NOT_FOUND};
    use std::path::PathBuf;

    fn setup_test_dir(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push("conversionsweep_tests");
        path.push(name);
        path.push(format!(
            "{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    fn quick_plan() -> TestPlan {
        let mut plan = load_plan("files/mamx_011054.toml").unwrap();
        plan.settle = crate::instrument::SettleTimes::none();
        plan.frequencies.rf_ghz.truncate(3);
        plan.losses.cable.rf_db = plan.simulation.output_loss_db.into();
        plan
    }

    #[test]
    fn command_names_round_trip() {
        for command in Command::all() {
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
        assert!("TX_IP3".parse::<Command>().is_err());
        assert!("upconvert".parse::<Command>().is_err());
        assert_eq!(Command::RxP1db.direction(), Direction::Receive);
        assert!(Command::TxOip3.is_two_tone());
    }

    #[test]
    fn every_command_closes_workbook() {
        let plan = quick_plan();
        for command in Command::all() {
            let sheets = run_plan(&plan, command, MemoryWorkbook::new(), "2026-10-18 09:05", "report.html").unwrap();
            assert_eq!(sheets[0].name, "Notes");
            let expected = match command {
                Command::TxP1db | Command::RxP1db => 3,
                _ => 2,
            };
            assert_eq!(sheets.len(), expected, "{}", command);
        }
    }

    #[test]
    fn upconvert_sheet_matches_model() {
        let plan = quick_plan();
        let sheets = run_plan(&plan, Command::Upconvert, MemoryWorkbook::new(), "2026-10-18 09:05", "r.html").unwrap();
        let sheet = &sheets[1];
        assert_eq!(sheet.name, "Up_Conversion");
        // two IF points, four LO drives, three RF points
        assert_eq!(sheet.row_count(), 1 + 2 * 4 * 3);
        let gain = sheet.number(1, 7).unwrap();
        // IF cable within 0.04 dB of the modelled one, plus jitter
        assert!((gain - plan.simulation.conversion_gain_db).abs() < 0.15, "gain {}", gain);
    }

    #[test]
    fn linear_device_reports_not_found() {
        let mut plan = quick_plan();
        plan.simulation.output_p1db_dbm = None;
        plan.simulation.jitter_db = 0.0;
        let sheets = run_plan(&plan, Command::RxP1db, MemoryWorkbook::new(), "2026-10-18 09:05", "r.html").unwrap();
        let compensated = &sheets[1];
        let ip1db_row = compensated.row_count() - 2;
        assert_eq!(compensated.text(ip1db_row, 0), Some("IP1dB (dBm)"));
        assert_eq!(compensated.text(ip1db_row, 1), Some(NOT_FOUND));
    }

    #[test]
    fn failed_plan_still_closes_workbook() {
        let mut plan = quick_plan();
        plan.power.lo_dbm.clear();
        let dir = setup_test_dir("failed_plan_still_closes_workbook");
        let path = dir.join("report.html");
        let result = run_plan(&plan, Command::Upconvert, HtmlWorkbook::new(&path, "t"), "2026-10-18 09:05", "report.html");
        assert!(result.is_err());
        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains("<h2>Notes</h2>"));
        assert!(!html.contains("Up_Conversion"));
    }

    #[test]
    fn test_run_function() {
        let test_dir = setup_test_dir("test_run_function");
        let toml_path = test_dir.join("quick_plan.toml");
        fs::copy("files/quick_plan.toml", &toml_path).unwrap();

        let args = vec![
            String::from("program_name"),
            toml_path.to_str().unwrap().to_string(),
            String::from("TX_OIP3"),
        ];
        let config = Config::run(&args).unwrap();
        assert!(config.report_path.starts_with(&test_dir));
        let html = fs::read_to_string(&config.report_path).unwrap();
        assert!(html.contains("<h2>Up_Conversion_IP3</h2>"));
    }

    #[test]
    fn report_stamps_use_local_date_time() {
        let at = chrono::NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 5, 42)
            .unwrap();
        let (created, report_name) = report_stamps("mamx_011054", at);
        assert_eq!(created, "2026-10-18 09:05");
        assert_eq!(report_name, "mamx_011054_2026-10-18_09-05.html");
    }

    #[test]
    fn run_names_report_by_date() {
        let test_dir = setup_test_dir("run_names_report_by_date");
        let toml_path = test_dir.join("quick_plan.toml");
        fs::copy("files/quick_plan.toml", &toml_path).unwrap();

        let args = vec![
            String::from("program_name"),
            toml_path.to_str().unwrap().to_string(),
            String::from("UPCONVERT"),
        ];
        let config = Config::run(&args).unwrap();
        let file_name = config.report_path.file_name().unwrap().to_str().unwrap().to_string();
        let stamp = file_name
            .strip_prefix("quick_")
            .and_then(|rest| rest.strip_suffix(".html"))
            .unwrap();
        assert!(NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H-%M").is_ok());
        let html = fs::read_to_string(&config.report_path).unwrap();
        assert!(html.contains(&file_name));
    }

    #[test]
    fn unknown_test_is_rejected_before_loading() {
        let args = vec![
            String::from("program_name"),
            String::from("does/not/exist.toml"),
            String::from("TX_IP3"),
        ];
        let err = Config::run(&args).unwrap_err();
        assert!(err.to_string().contains("unknown test"));
    }

    #[test]
    fn test_config_build_not_enough_args() {
        let args = vec![String::from("program_name")];
        assert!(Config::run(&args).is_err());

        let args = vec![String::from("program_name"), String::from("plan.toml")];
        assert!(Config::run(&args).is_err());
    }

    #[test]
    fn test_version_output_format() {
        let version = env!("CARGO_PKG_VERSION");
        let parts: Vec<&str> = version.split('.').collect();
        assert_eq!(parts.len(), 3, "Version should be in X.Y.Z format");
    }
}
