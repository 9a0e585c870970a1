use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use mksservo_lib::{
    client::Servo,
    protocol::{AbsoluteMove, Address, IoOutputs},
    serialport::SerialTransport,
};
use std::{ops::Deref, panic};

mod commandline;
mod config;

use commandline::{CliArgs, CliCommands};
use config::LinkConfig;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn print_words(words: &[u16], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(words)?);
    } else {
        for word in words {
            print!("{word:#06X} ");
        }
        println!();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let config = LinkConfig::from_args(&args)?;
    debug!("link config: {:?}", config);

    let address = Address::try_from(config.address)?;
    let servo = Servo::new(address).with_timeout(config.timeout);

    let mut link = SerialTransport::open(&config.device, config.baud_rate)
        .with_context(|| format!("Cannot open serial port '{}'", config.device))?;
    link.set_delay(config.delay);

    match args.command {
        CliCommands::Read { register, count } => {
            let words = servo
                .read(&mut link, register, count)
                .with_context(|| format!("Cannot read input registers at {register:#06X}"))?;
            print_words(&words, args.json)?;
        }
        CliCommands::ReadHolding { register, count } => {
            let words = servo
                .read_holding(&mut link, register, count)
                .with_context(|| format!("Cannot read holding registers at {register:#06X}"))?;
            print_words(&words, args.json)?;
        }
        CliCommands::Write { register, value } => servo
            .write_single(&mut link, register, value)
            .with_context(|| format!("Cannot write register {register:#06X}"))?,
        CliCommands::WriteMultiple { register, values } => servo
            .write_multiple(&mut link, register, &values)
            .with_context(|| format!("Cannot write registers at {register:#06X}"))?,
        CliCommands::ReadIo => {
            let io = servo.read_io(&mut link).with_context(|| "Cannot read IO")?;
            if args.json {
                println!("{}", serde_json::to_string(&io)?);
            } else {
                println!("IO: {io}");
            }
        }
        CliCommands::WriteIo { out1, out2 } => servo
            .write_io(&mut link, &IoOutputs::set(out1, out2))
            .with_context(|| "Cannot write IO")?,
        CliCommands::MoveAbsolute {
            acceleration,
            speed,
            angle,
        } => servo
            .move_absolute(
                &mut link,
                &AbsoluteMove {
                    acceleration,
                    speed,
                    angle,
                },
            )
            .with_context(|| format!("Cannot move to angle {angle}"))?,
    }

    Ok(())
}
