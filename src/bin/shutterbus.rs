use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use shutterbus::ports::PublishedMessage;
use shutterbus::protocol::{Command, CommandResponse, CommandType, CoverAction, ResponseStatus};
use shutterbus::{Direction, ShutterStatus};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn index_arg() -> Arg<'static, 'static> {
    Arg::with_name("index")
        .short("i")
        .long("index")
        .value_name("INDEX")
        .help("Shutter index (defaults to the only configured shutter)")
        .takes_value(true)
}

fn number_arg(name: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .help(help)
        .required(true)
        .validator(|v| match v.parse::<f64>() {
            Ok(_) => Ok(()),
            Err(_) => Err("value must be a number".into()),
        })
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("shutterbus")
        .version("0.1.0")
        .author("Home Automation Engineering Team")
        .about("🪟  Shutterbus - control relay-driven window shutters")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Controller host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Controller port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("ping").about("🏓 Test connection to the controller"))
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Show shutter status")
                .arg(index_arg().help("Shutter index (all shutters when omitted)")),
        )
        .subcommand(
            SubCommand::with_name("configure")
                .about("🔧 Assign an open/close channel pair to a shutter slot")
                .arg(Arg::with_name("index").help("Shutter index").required(true))
                .arg(Arg::with_name("open").help("Open relay channel").required(true))
                .arg(Arg::with_name("close").help("Close relay channel").required(true)),
        )
        .subcommand(SubCommand::with_name("open").about("⬆️  Open (toggles to stop while opening)").arg(index_arg()))
        .subcommand(SubCommand::with_name("close").about("⬇️  Close (toggles to stop while closing)").arg(index_arg()))
        .subcommand(SubCommand::with_name("stop").about("⏹️  Stop motion").arg(index_arg()))
        .subcommand(
            SubCommand::with_name("position")
                .about("🎯 Move to a position in percent (0 closed, 100 open)")
                .arg(index_arg())
                .arg(number_arg("percent", "Target position")),
        )
        .subcommand(
            SubCommand::with_name("state")
                .about("Absolute cover action")
                .arg(index_arg())
                .arg(
                    Arg::with_name("action")
                        .help("Cover action")
                        .required(true)
                        .possible_values(&["open", "close", "stop"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("interlock")
                .about("⚡ Set the reversal dead time in milliseconds (0 disables)")
                .arg(index_arg())
                .arg(number_arg("ms", "Delay in milliseconds")),
        )
        .subcommand(
            SubCommand::with_name("travel")
                .about("⏱️  Set the full travel time in milliseconds (minimum 1000)")
                .arg(index_arg())
                .arg(number_arg("ms", "Travel time in milliseconds")),
        )
        .subcommand(SubCommand::with_name("discovery").about("📣 Publish discovery announcements"))
        .subcommand(
            SubCommand::with_name("raw")
                .about("Send a console command line, e.g. 'ShutterPosition1 40'")
                .arg(Arg::with_name("line").help("Command line").required(true).multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor published status messages")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Monitor duration in seconds (default: infinite)")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");

    let (name, sub_matches) = matches.subcommand();
    let sub_matches = match sub_matches {
        Some(sub_matches) => sub_matches,
        None => return Ok(()),
    };

    if name == "monitor" {
        let duration = sub_matches
            .value_of("duration")
            .map(str::parse::<u64>)
            .transpose()?
            .map(Duration::from_secs);
        return monitor(host, port, format, duration).await;
    }

    if name == "raw" {
        let line = sub_matches.values_of("line").map(|v| v.collect::<Vec<_>>().join(" ")).unwrap_or_default();
        let response = send_line(host, port, &line).await?;
        print_response(&line, &response, format);
        return Ok(());
    }

    let command_type = build_command(name, sub_matches)?;
    let command = Command { id: 1, command_type };
    let response = send_line(host, port, &serde_json::to_string(&command)?).await?;
    print_response(name, &response, format);

    Ok(())
}

fn parse_index(matches: &ArgMatches<'_>) -> CliResult<Option<usize>> {
    Ok(matches.value_of("index").map(str::parse::<usize>).transpose()?)
}

fn build_command(name: &str, matches: &ArgMatches<'_>) -> CliResult<CommandType> {
    let index = parse_index(matches)?;

    let command_type = match name {
        "ping" => CommandType::Ping,
        "status" => CommandType::Status { index },
        "configure" => CommandType::Configure {
            index: matches.value_of("index").unwrap_or_default().parse()?,
            open_channel: matches.value_of("open").unwrap_or_default().parse()?,
            close_channel: matches.value_of("close").unwrap_or_default().parse()?,
        },
        "open" => CommandType::Open { index },
        "close" => CommandType::Close { index },
        "stop" => CommandType::Stop { index },
        "position" => CommandType::SetPosition {
            index,
            position: matches.value_of("percent").unwrap_or_default().parse()?,
        },
        "state" => CommandType::SetState {
            index,
            action: match matches.value_of("action") {
                Some("open") => CoverAction::Open,
                Some("close") => CoverAction::Close,
                _ => CoverAction::Stop,
            },
        },
        "interlock" => CommandType::SetInterlockDelay {
            index,
            delay_ms: matches.value_of("ms").unwrap_or_default().parse()?,
        },
        "travel" => CommandType::SetTravelTime {
            index,
            travel_time_ms: matches.value_of("ms").unwrap_or_default().parse()?,
        },
        "discovery" => CommandType::Discovery,
        other => return Err(format!("unknown command '{}'", other).into()),
    };

    Ok(command_type)
}

/// Sends one line and waits for the matching response. Published status
/// messages streamed on the same connection are skipped.
async fn send_line(host: &str, port: u16, line: &str) -> CliResult<CommandResponse> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to shutter controller at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Controller is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin shutterbus-simulator".bright_cyan());
            }
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut lines = BufReader::new(reader).lines();
    let wait = async {
        while let Some(received) = lines.next_line().await? {
            if let Ok(response) = serde_json::from_str::<CommandResponse>(&received) {
                return Ok(response);
            }
        }
        Err::<CommandResponse, _>(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Server closed connection",
        ))
    };

    match tokio::time::timeout(RESPONSE_TIMEOUT, wait).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} Command timed out after {} seconds", "⏰".yellow(), RESPONSE_TIMEOUT.as_secs());
            Err("Command timeout".into())
        }
    }
}

fn print_response(action: &str, response: &CommandResponse, format: &str) {
    if format == "json" {
        match serde_json::to_string_pretty(response) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{} {}", "❌".red(), e),
        }
        return;
    }

    match response.status {
        ResponseStatus::Success => {
            let message = response.message.as_deref().unwrap_or("ok");
            println!("{} {} {}", "✅".green(), action.bright_white(), message.bright_green());
        }
        ResponseStatus::Rejected => {
            let message = response.message.as_deref().unwrap_or("rejected");
            println!("{} {} rejected: {}", "❌".red(), action.bright_white(), message.bright_red());
            if message.contains("no single configured shutter") {
                println!("{} Pass {} to pick a shutter", "💡".yellow(), "--index N".bright_cyan());
            }
        }
        ResponseStatus::InvalidCommand => {
            let message = response.message.as_deref().unwrap_or("invalid command");
            println!("{} {}", "❓".blue(), message.bright_red());
        }
    }

    if !response.shutters.is_empty() {
        print_status_table(&response.shutters);
    }
}

fn print_status_table(shutters: &[ShutterStatus]) {
    println!("{}", "┌───────┬──────────┬────────┬──────────┬─────────────┬────────┬────────┐".bright_white());
    println!("{}", "│ Index │ Position │ Target │ State    │ Direction   │ Open   │ Close  │".bright_white());
    println!("{}", "├───────┼──────────┼────────┼──────────┼─────────────┼────────┼────────┤".bright_white());

    for status in shutters {
        let direction = match status.direction {
            Direction::Idle => "idle".normal(),
            Direction::Opening => "opening".bright_green(),
            Direction::Closing => "closing".bright_yellow(),
            Direction::InterlockWait(_) => "interlock".bright_red(),
        };

        println!(
            "│ {:>5} │ {:>7.1}% │ {:>5.0}% │ {:<8} │ {:<11} │ {:<6} │ {:<6} │",
            status.index,
            status.position,
            status.target_position,
            status.state.as_str(),
            direction,
            relay(status.open_channel, status.open_output),
            relay(status.close_channel, status.close_output),
        );
    }

    println!("{}", "└───────┴──────────┴────────┴──────────┴─────────────┴────────┴────────┘".bright_white());
}

fn relay(channel: u16, on: bool) -> ColoredString {
    let label = format!("{}:{}", channel, if on { "on" } else { "off" });
    if on {
        label.bright_green()
    } else {
        label.dimmed()
    }
}

async fn monitor(host: &str, port: u16, format: &str, duration: Option<Duration>) -> CliResult<()> {
    let stream = TcpStream::connect((host, port)).await?;
    let mut lines = BufReader::new(stream).lines();

    if format != "json" {
        println!("{}", "📈 Watching published status (Ctrl+C to quit)".bright_blue().bold());
    }

    let watch = async {
        while let Some(line) = lines.next_line().await? {
            if format == "json" {
                println!("{}", line);
                continue;
            }
            match serde_json::from_str::<PublishedMessage>(&line) {
                Ok(message) => {
                    let retained = if message.retain { " (retained)".dimmed() } else { "".normal() };
                    println!("{} {}{}", message.topic.bright_cyan(), message.payload.bright_white(), retained);
                }
                Err(_) => println!("{}", line.dimmed()),
            }
        }
        Ok::<(), std::io::Error>(())
    };

    match duration {
        Some(duration) => {
            if tokio::time::timeout(duration, watch).await.is_err() {
                println!("{}", "Monitor duration elapsed".dimmed());
            }
        }
        None => watch.await?,
    }

    Ok(())
}
