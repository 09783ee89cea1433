mod analyzer;
mod models;
mod source;
mod text;

use analyzer::{render, Filter, FilterOptions, Report, Settings, View};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use models::{Config, Response};
use source::{DataSource, DatasetStore};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("alert-reasons-analyzer")
        .version("0.1")
        .about("Summarizes early-alert survey responses on student underperformance")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("year")
                .short('y')
                .long("year")
                .value_name("YEAR")
                .help("Year to report on (defaults to the latest in the data)")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("month")
                .short('m')
                .long("month")
                .value_name("MONTH")
                .help("Month to report on, 1-12 (defaults to the latest in the data)")
                .value_parser(clap::value_parser!(u32).range(1..=12)),
        )
        .arg(
            Arg::new("subject")
                .short('s')
                .long("subject")
                .value_name("NAME")
                .help("Restrict to a subject; repeat for several")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Keep running and re-render after every filter change")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print debug diagnostics")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!("⚠️  Please edit {} and point it at your survey data, then run the program again.", config_file);
        return Ok(());
    };

    init_logging(&config, matches.get_flag("verbose"));

    let data_source = DataSource::from_config(&config)
        .with_context(|| format!("Invalid configuration in {}", config_file))?;
    println!("📂 Reading survey responses from: {}", data_source.describe());

    // A failed initial load ends the program
    let mut store = DatasetStore::init(data_source).await?;
    let settings = Settings::from_config(&config);

    let dataset = store.snapshot();
    println!("   ✅ Loaded {} responses", dataset.len());

    let filter = match initial_filter(
        &dataset,
        matches.get_one::<i32>("year").copied(),
        matches.get_one::<u32>("month").copied(),
        matches
            .get_many::<String>("subject")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
    ) {
        Some(filter) => filter,
        None => {
            println!("❌ No dated responses found; pass --year and --month explicitly");
            return Ok(());
        }
    };

    print_view(&render(&dataset, &filter, &settings));

    if matches.get_flag("interactive") {
        run_shell(&mut store, filter, &settings).await?;
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config
            .log_level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(log::LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.init();
}

/// Fill in year and month from the latest period present when not given.
fn initial_filter(
    dataset: &[Response],
    year: Option<i32>,
    month: Option<u32>,
    subjects: Vec<String>,
) -> Option<Filter> {
    let latest = FilterOptions::latest_period(dataset);
    let year = year.or(latest.map(|(y, _)| y))?;
    let month = month.or(latest.map(|(_, m)| m))?;
    Some(Filter::new(year, month).with_subjects(subjects))
}

#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Year(i32),
    Month(u32),
    Subjects(Vec<String>),
    Clear,
    Reload,
    Show,
    Options,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<ShellCommand> {
    let line = line.trim();
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "year" => ShellCommand::Year(
            arg.parse::<i32>()
                .with_context(|| format!("Invalid year: {:?}", arg))?,
        ),
        "month" => {
            let month: u32 = arg
                .parse()
                .with_context(|| format!("Invalid month: {:?}", arg))?;
            if !(1..=12).contains(&month) {
                anyhow::bail!("Month must be between 1 and 12, got {}", month);
            }
            ShellCommand::Month(month)
        }
        "subject" | "subjects" => ShellCommand::Subjects(
            arg.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        "clear" => ShellCommand::Clear,
        "reload" => ShellCommand::Reload,
        "" | "show" => ShellCommand::Show,
        "options" => ShellCommand::Options,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => anyhow::bail!("Unknown command: {} (type 'help')", other),
    };
    Ok(command)
}

/// Read commands from stdin; every filter change renders a fresh view.
async fn run_shell(store: &mut DatasetStore, mut filter: Filter, settings: &Settings) -> Result<()> {
    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("❌ {:#}", e);
                continue;
            }
        };

        match command {
            ShellCommand::Year(year) => filter.year = year,
            ShellCommand::Month(month) => filter.month = month,
            ShellCommand::Subjects(subjects) => filter.subjects = subjects,
            ShellCommand::Clear => filter.subjects.clear(),
            ShellCommand::Reload => match store.reload().await {
                Ok(count) => println!("🔄 Reloaded {} responses from {}", count, store.source().describe()),
                Err(e) => {
                    println!("❌ Reload failed, keeping previous data: {:#}", e);
                    continue;
                }
            },
            ShellCommand::Show => {}
            ShellCommand::Options => {
                print_options(&FilterOptions::from_responses(&store.snapshot()));
                continue;
            }
            ShellCommand::Help => {
                print_help();
                continue;
            }
            ShellCommand::Quit => break,
        }

        print_view(&render(&store.snapshot(), &filter, settings));
    }

    Ok(())
}

fn print_help() {
    println!("\nCommands: year N | month N | subject A,B | clear | reload | show | options | help | quit");
}

fn print_options(options: &FilterOptions) {
    let years: Vec<String> = options.years.iter().map(|y| y.to_string()).collect();
    let months: Vec<String> = options.months.iter().map(|m| m.to_string()).collect();
    println!("📅 Years: {}", years.join(", "));
    println!("📅 Months: {}", months.join(", "));
    println!("📚 Subjects: {}", options.subjects.join(", "));
}

fn describe_filter(filter: &Filter) -> String {
    let subjects = if filter.subjects.is_empty() {
        "ALL SUBJECTS".to_string()
    } else {
        filter.subjects.join(", ")
    };
    format!("{:04}-{:02} · {}", filter.year, filter.month, subjects)
}

fn print_view(view: &View) {
    match view {
        View::NoData { filter } => {
            println!("\n🔍 {}", describe_filter(filter));
            println!("   ❓ No responses match the selected filters");
        }
        View::Report(report) => print_report(report),
    }
}

fn print_report(report: &Report) {
    println!("\n📊 SUMMARY · {}", describe_filter(&report.filter));
    println!("==========\n");

    let metrics = &report.metrics;
    println!("   Responses: {}", metrics.total_responses);
    println!("   Subjects: {}", metrics.distinct_subjects);
    if let Some(top) = &metrics.top_subject {
        println!("   Most reported: {} ({})", top.subject, top.count);
    }
    println!("   With a stated reason: {}", metrics.with_reason);
    println!("   With a secondary reason: {}", metrics.with_secondary_reason);

    println!("\n📈 Responses per subject:");
    let widest = report.subject_counts.iter().map(|c| c.count).max().unwrap_or(1).max(1);
    for count in &report.subject_counts {
        let bar = "█".repeat((count.count * 30).div_ceil(widest));
        println!("   {:<30} {:>4} {}", count.subject, count.count, bar);
    }

    print_crosstab(report);

    println!("\n💬 Most frequent reasons:");
    if !report.has_significant_text() {
        println!("   ❓ No significant words in the selected responses");
        return;
    }
    for (i, (phrase, weight)) in report.top_phrases.iter().enumerate() {
        println!("   {:>2}. {:<35} {}", i + 1, phrase, weight);
    }
    let multi_word = report.phrases.iter().filter(|(phrase, _)| phrase.contains(' ')).count();
    println!(
        "   ({} phrases available for the word cloud, {} in total, {} multi-word, combined weight {})",
        report.cloud.len(),
        report.phrases.len(),
        multi_word,
        report.phrases.total_weight()
    );
}

fn print_crosstab(report: &Report) {
    let tab = &report.crosstab;
    println!("\n🗓️  Responses by subject and month ({}):", tab.year);
    if tab.is_empty() {
        println!("   ❓ No dated responses for this year");
        return;
    }

    let mut header = format!("   {:<30}", "");
    for label in MONTH_LABELS {
        header.push_str(&format!("{:>5}", label));
    }
    println!("{}", header);

    for subject in &tab.subjects {
        let mut line = format!("   {:<30}", subject);
        for month in 1..=12 {
            line.push_str(&format!("{:>5}", tab.get(subject, month)));
        }
        println!("{}", line);
    }
}
