use clap::Parser;
use reportkit::{Cli, run};

fn main() {
    // `reportkit render simple --format csv | head` closes stdout early.
    #[cfg(unix)]
    restore_default_sigpipe();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        // `{:#}` keeps the cause chain, e.g. the sqlite error behind a store error.
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

#[cfg(unix)]
fn restore_default_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}
