use std::{fmt::Display, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use clap::{
    arg, crate_authors, crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches,
    Command,
};
use pad::PadStr;
use tscan::{
    error::ScanError,
    logger,
    port::PortsToScan,
    resolver::{self, FamilyPreference},
    scan::{ScanResult, Scanner},
};

const RULE_WIDTH: usize = 60;

struct ParsedArgs {
    debug: u8,
    ports: PortsToScan,
    family: FamilyPreference,
    timeout: Duration,
    workers: usize,
    target: String,
}

fn parse_timeout(raw: &str) -> Result<Duration, ScanError> {
    let invalid = || ScanError::InvalidTimeout(raw.into());

    let secs = raw.trim().parse::<f64>().map_err(|_| invalid())?;
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(invalid()),
    }
}

fn parse_args(matches: ArgMatches) -> Result<ParsedArgs, ScanError> {
    let debug = matches.get_count("debug");

    let ports = if matches.get_flag("well-known") {
        PortsToScan::WellKnown
    } else {
        // Has a default value.
        PortsToScan::Selected(matches.get_one::<String>("ports").cloned().unwrap_or_default())
    };

    let family = if matches.get_flag("ipv4") {
        FamilyPreference::Ipv4Only
    } else if matches.get_flag("ipv6") {
        FamilyPreference::Ipv6Only
    } else {
        FamilyPreference::Both
    };

    let timeout = parse_timeout(
        matches
            .get_one::<String>("timeout")
            .map(String::as_str)
            .unwrap_or_default(),
    )?;

    let workers = match matches.get_one::<usize>("workers") {
        Some(&n) if n > 0 => n,
        _ => return Err(ScanError::InvalidConcurrency),
    };

    let target = matches
        .get_one::<String>("target")
        .cloned()
        .unwrap_or_default();

    Ok(ParsedArgs {
        debug,
        ports,
        family,
        timeout,
        workers,
        target,
    })
}

fn rule() -> String {
    "".pad_to_width_with_char(RULE_WIDTH, '=')
}

fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn print_header(parsed: &ParsedArgs, scanner: &Scanner) {
    let mut out = format!("{}\nTarget: {}\n", rule(), parsed.target);
    scanner
        .candidates()
        .iter()
        .for_each(|c| out.push_str(&format!("  - {}\n", c)));
    out.push_str(&format!(
        "Ports: {}  Timeout: {}s  Workers: {}\nStarted: {}\n{}\n",
        scanner.ports().len(),
        parsed.timeout.as_secs_f64(),
        parsed.workers,
        timestamp(&Local::now()),
        rule(),
    ));

    print!("{}", out);
}

fn print_results(result: ScanResult) {
    let mut out = format!(
        "{}\nFinished: {}\nScan Duration: {:.4}s\nScanned: {} ports\n\n",
        rule(),
        timestamp(&result.finished_at),
        result.elapsed().as_secs_f32(),
        result.total,
    );

    if result.open_ports.is_empty() {
        out.push_str("No open ports found.\n");
    } else {
        out.push_str("Port    State\n");
        result.open_ports.iter().for_each(|port| {
            out.push_str(&format!("{}open\n", port.to_string().pad_to_width(8)))
        });

        let joined = result
            .open_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("\nOpen ports: {}\n", joined));
    }
    out.push_str(&rule());
    out.push('\n');

    print!("{}", out);
}

fn main() -> Result<()> {
    let arg_matches = Command::new(crate_name!())
        .about(
            "IPv4 and IPv6 TCP connect scanner.\n\
            Use only against hosts you have permission to test.",
        )
        .version(crate_version!())
        .arg_required_else_help(true)
        .author(crate_authors!())
        .args([
            // Miscellaneous arguments.
            arg!(-d --debug "Turns on debugging information (twice for trace)")
                .action(ArgAction::Count),
            arg!([target] "Hostname or IP address to scan").required(true),
        ])
        .args([
            // Port selection.
            arg!(-p --ports <PORTS> "Ports to scan, e.g. `22`, `1-1024`, `22,80-90`")
                .default_value("1-1024"),
            Arg::new("well-known")
                .long("well-known")
                .help("Scan a preset list of well-known ports")
                .action(ArgAction::SetTrue),
        ])
        .args([
            // Address families.
            Arg::new("ipv4")
                .short('4')
                .long("ipv4")
                .help("Only resolve IPv4 addresses")
                .action(ArgAction::SetTrue)
                .conflicts_with("ipv6"),
            Arg::new("ipv6")
                .short('6')
                .long("ipv6")
                .help("Only resolve IPv6 addresses")
                .action(ArgAction::SetTrue),
        ])
        .args([
            // Tuning.
            arg!(-t --timeout <SECS> "Connect timeout per address, in seconds")
                .default_value("1.0"),
            arg!(-w --workers <N> "Number of concurrent probes")
                .value_parser(value_parser!(usize))
                .default_value("200"),
        ])
        .get_matches();

    // Extract arguments.
    let parsed = parse_args(arg_matches)?;

    // Set debug if desired.
    if parsed.debug > 0 {
        logger::init(logger::level(parsed.debug));
    }

    // Select ports.
    let ports = parsed.ports.ports()?;
    if ports.is_empty() {
        return Err(ScanError::NoPortsSelected.into());
    }

    // Resolve target.
    let candidates = resolver::resolve(&parsed.target, parsed.family)?;

    // Start scanner.
    let scanner = Scanner::new(candidates, &ports, parsed.timeout, parsed.workers)?;
    print_header(&parsed, &scanner);

    let result = scanner.start_with(|pr| {
        if pr.open {
            println!("[+] Port {} is open", pr.port);
        }
    })?;

    // Show result.
    print_results(result);

    Ok(())
}
