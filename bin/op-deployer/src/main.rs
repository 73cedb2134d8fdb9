//! The `op-deployer` executable.

use std::process::ExitCode;

use clap::Parser;
use op_deployer_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    set_thread_panic_hook();
    let cli = Cli::parse();
    let res = match cli.log_args.init() {
        Ok(()) => cli.cmd.run().await,
        Err(err) => Err(err),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Application failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Sets thread panic hook, so a panicking task exits the process.
fn set_thread_panic_hook() {
    use std::{
        backtrace::Backtrace,
        panic::{set_hook, take_hook},
        process::exit,
    };
    let orig_hook = take_hook();
    set_hook(Box::new(move |panic_info| {
        eprintln!("Custom backtrace: {}", Backtrace::capture());
        orig_hook(panic_info);
        exit(1);
    }));
}
