// src/main.rs

use nomad_watch::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level, args.verbose, args.quiet) {
        eprintln!("nomad-watch: error: {err:#}");
        std::process::exit(1);
    }
    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("nomad-watch: error: {err:#}");
            std::process::exit(1);
        }
    }
}
