// src/main.rs

use dagrun::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(status) if status.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(err) => {
            eprintln!("dagrun error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<dagrun::types::RunStatus> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
