use std::process::ExitCode;

use clap::Parser;

use shining_glasses::{Args, BleAdapter, fake_adapter, real_adapter, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let (command, options, maybe_fake_args) = args.into_parts()?;
        let adapter: Box<dyn BleAdapter> = match maybe_fake_args {
            Some(fake_args) => Box::new(fake_adapter(fake_args)),
            None => real_adapter().await?,
        };

        run(command, &options, &mut stdout, adapter).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
