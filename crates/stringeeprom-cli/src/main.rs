//! Command-line front end for StringEEPROM devices
//!
//! Thin presentation layer over `stringeeprom-core`: loads the optional
//! label file, renders session events, and maps console commands onto
//! engine operations.

mod labels;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stringeeprom_core::prelude::*;
use stringeeprom_core::protocol::DEFAULT_BAUD_RATE;

#[derive(Parser, Debug)]
#[command(name = "stringeeprom", version, about = "Serial configuration tool for StringEEPROM-based devices")]
struct Args {
    /// Serial port (defaults to the first discovered port)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Label configuration file, one label per line
    #[arg(long, default_value = "stringeeprom.cfg")]
    labels: PathBuf,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Connect immediately instead of waiting for the connect command
    #[arg(long)]
    connect: bool,
}

fn print_ports(ports: &[PortInfo]) {
    if ports.is_empty() {
        println!("No serial ports available");
        return;
    }
    for port in ports {
        match &port.product {
            Some(product) => println!("  {}  ({})", port.name, product),
            None => println!("  {}", port.name),
        }
    }
}

fn print_table(entries: &[Entry]) {
    if entries.is_empty() {
        println!("(table empty)");
        return;
    }
    let width = entries.iter().map(|e| e.label.len()).max().unwrap_or(0);
    for entry in entries {
        println!("{:>3}  {:<width$}  {}", entry.index, entry.label, entry.value);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  connect [port]   open the session (optional port override)");
    println!("  disconnect       close the session");
    println!("  refresh          re-read the table, or the port list when idle");
    println!("  count            query the table size only");
    println!("  set <n> <text>   write <text> to slot <n>");
    println!("  raw <text>       send a raw command line");
    println!("  show             print the current table");
    println!("  json             print the current table as JSON");
    println!("  ports            list serial ports");
    println!("  quit             exit");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.list_ports {
        print_ports(&SessionEngine::list_ports());
        return Ok(());
    }

    let (mut engine, events) = SessionEngine::new();
    engine.set_labeler(labels::make_labeler(labels::load_labels(&args.labels)));

    // Render engine events as they arrive; table updates stay quiet and
    // are inspected with `show`, matching how a windowed front end would
    // redraw instead of logging.
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                SessionEvent::Log(line) => println!("{}", line),
                SessionEvent::TableChanged(_) => {}
                SessionEvent::StateChanged { state, reason } => {
                    println!("* state: {:?} ({:?})", state, reason);
                }
                SessionEvent::PortsRefreshed(ports) => print_ports(&ports),
            }
        }
    });

    let default_port = || -> Option<String> {
        args.port
            .clone()
            .or_else(|| SessionEngine::list_ports().first().map(|p| p.name.clone()))
    };

    if args.connect {
        match default_port() {
            Some(port) => {
                let config = SessionConfig {
                    port_name: port,
                    baud_rate: args.baud,
                };
                if let Err(e) = engine.connect(config) {
                    eprintln!("connect failed: {}", e);
                }
            }
            None => eprintln!("no serial port available"),
        }
    }

    print_help();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        let outcome = match cmd {
            "" => Ok(()),
            "connect" => {
                let port = if rest.is_empty() {
                    default_port()
                } else {
                    Some(rest.to_string())
                };
                match port {
                    Some(port_name) => engine.connect(SessionConfig {
                        port_name,
                        baud_rate: args.baud,
                    }),
                    None => {
                        eprintln!("no serial port available");
                        Ok(())
                    }
                }
            }
            "disconnect" => engine.disconnect(),
            "refresh" => engine.refresh(),
            "count" => engine.request_count(),
            "set" => match rest.split_once(' ') {
                Some((index, text)) => match index.parse::<usize>() {
                    Ok(index) => engine.send_entry(index, text),
                    Err(_) => {
                        eprintln!("usage: set <n> <text>");
                        Ok(())
                    }
                },
                None => {
                    eprintln!("usage: set <n> <text>");
                    Ok(())
                }
            },
            "raw" => engine.send_custom(rest),
            "show" => {
                print_table(&engine.snapshot());
                Ok(())
            }
            "json" => {
                println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
                Ok(())
            }
            "ports" => {
                print_ports(&SessionEngine::list_ports());
                Ok(())
            }
            "help" => {
                print_help();
                Ok(())
            }
            "quit" | "exit" => break,
            other => {
                eprintln!("unknown command: {} ('help' for help)", other);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            eprintln!("error: {}", e);
        }
    }

    if engine.state() == ConnectionState::Connected {
        let _ = engine.disconnect();
    }
    drop(engine);
    let _ = printer.join();
    Ok(())
}
