//! Command-line parsing and help text for the `daycall` binary.
use crate::model::{AlarmId, ChallengeType, RepeatDays, parse_clock};
use anyhow::{Result, anyhow, bail};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlarm {
    pub hour: u32,
    pub minute: u32,
    pub days: RepeatDays,
    pub label: Option<String>,
    pub sound: Option<String>,
    pub challenge: Option<ChallengeType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add(NewAlarm),
    Remove(AlarmId),
    Enable(AlarmId),
    Disable(AlarmId),
    Next,
    Status,
    Backup(bool),
    Cleanup,
    Debug,
    Run,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub root: Option<PathBuf>,
    pub verbose: bool,
    pub command: Command,
}

fn parse_id(arg: Option<&String>, cmd: &str) -> Result<AlarmId> {
    let raw = arg.ok_or_else(|| anyhow!("'{}' needs an alarm id", cmd))?;
    raw.parse()
        .map_err(|_| anyhow!("'{}' is not a valid alarm id", raw))
}

fn flag_value<'a>(rest: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    rest.get(i + 1)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_add(rest: &[String]) -> Result<NewAlarm> {
    let time = rest
        .first()
        .ok_or_else(|| anyhow!("'add' needs a time (HH:MM)"))?;
    let (hour, minute) = parse_clock(time)?;
    let mut alarm = NewAlarm {
        hour,
        minute,
        days: RepeatDays::NONE,
        label: None,
        sound: None,
        challenge: None,
    };

    let mut i = 1;
    while i < rest.len() {
        let flag = rest[i].as_str();
        match flag {
            "--days" | "-d" => alarm.days = RepeatDays::parse(flag_value(rest, i, flag)?)?,
            "--label" | "-l" => alarm.label = Some(flag_value(rest, i, flag)?.clone()),
            "--sound" | "-s" => alarm.sound = Some(flag_value(rest, i, flag)?.clone()),
            "--challenge" | "-c" => {
                let raw = flag_value(rest, i, flag)?;
                let challenge = ChallengeType::from_str(raw)
                    .map_err(|_| anyhow!("Unknown challenge '{}'", raw))?;
                alarm.challenge = Some(challenge);
            }
            other => bail!("Unknown option '{}' for 'add'", other),
        }
        i += 2;
    }
    Ok(alarm)
}

/// Parses `args` as produced by `std::env::args()` (program name first).
pub fn parse_args(args: &[String]) -> Result<Args> {
    let mut root = None;
    let mut verbose = false;
    let mut rest: Vec<String> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--root" | "-r" if rest.is_empty() => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--root needs a path"))?;
                root = Some(PathBuf::from(path));
            }
            "--verbose" | "-v" if rest.is_empty() => verbose = true,
            _ => rest.push(arg.clone()),
        }
    }

    let command = match rest.first().map(String::as_str) {
        None | Some("list") | Some("ls") => Command::List,
        Some("--help") | Some("-h") | Some("help") => Command::Help,
        Some("add") => Command::Add(parse_add(&rest[1..])?),
        Some(cmd @ ("remove" | "rm")) => Command::Remove(parse_id(rest.get(1), cmd)?),
        Some("enable") => Command::Enable(parse_id(rest.get(1), "enable")?),
        Some("disable") => Command::Disable(parse_id(rest.get(1), "disable")?),
        Some("next") => Command::Next,
        Some("status") => Command::Status,
        Some("backup") => match rest.get(1).map(String::as_str) {
            Some("on") => Command::Backup(true),
            Some("off") => Command::Backup(false),
            _ => bail!("Usage: backup on|off"),
        },
        Some("cleanup") => Command::Cleanup,
        Some("debug") => Command::Debug,
        Some("run") => Command::Run,
        Some(other) => bail!("Unknown command '{}'. Try --help.", other),
    };

    Ok(Args {
        root,
        verbose,
        command,
    })
}

pub fn print_help(binary_name: &str) {
    println!(
        "DayCall v{} - A reliable alarm clock engine",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] [-v] <command>", binary_name);
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -v, --verbose         Log debug output to stderr.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("COMMANDS:");
    println!("    list                          List stored alarms (default)");
    println!("    add <HH:MM> [options]         Create an alarm");
    println!("        --days <days>             mon,wed,fri | weekdays | weekends | daily");
    println!("        --label <text>            Label shown while ringing");
    println!("        --sound <name>            Alarm sound");
    println!("        --challenge <type>        MATH, MEMORY, TYPING, SHAKE or NONE");
    println!("    remove <id>                   Delete an alarm");
    println!("    enable <id> / disable <id>    Toggle an alarm");
    println!("    next                          Show the next alarm to ring");
    println!("    status                        Show the alarm reliability report");
    println!("    backup on|off                 Toggle backup triggers");
    println!("    cleanup                       Cancel stray timers and re-arm alarms");
    println!("    debug                         Dump pending tasks and stored alarms");
    println!("    run                           Run the alarm daemon (Ctrl-C to stop)");
    println!();
    println!("EXAMPLES:");
    println!("    {} add 06:45 --days weekdays --label \"Work\"", binary_name);
    println!("    {} add 9:30 --days sat,sun --challenge none", binary_name);
    println!("    {} disable 2", binary_name);
}
