use anyhow::{Context, Result};
use aurora_core::cli::{print_configuration, SolveArgs};
use aurora_core::utils::{telemetry, Interrupt};
use aurora_core::{run_solver, Ns3Env, Ppo1Agent};
use burn::backend::{Autodiff, NdArray};
use clap::Parser;

type Backend = Autodiff<NdArray>;

fn main() -> Result<()> {
    let args = SolveArgs::parse();
    telemetry::init(args.debug);
    let config = args.into_config()?;
    print_configuration(&config);

    let env = Ns3Env::connect(config.env_config(), Interrupt::new())
        .with_context(|| format!("failed to open ns-3 session on port {}", config.port))?;

    let device = Default::default();
    let report = run_solver(
        &config,
        env,
        |settings, env| {
            Ppo1Agent::<Backend>::for_env(
                settings.ppo1_config(),
                &settings.arch,
                env,
                Some(settings.log_dir.as_path()),
                &device,
            )
        },
        chrono::Local::now(),
    )?;

    tracing::info!(
        "finished: {} iterations, checkpoint loaded: {}, export: {:?}",
        report.iterations_run,
        report.loaded_checkpoint,
        report.export_dir
    );
    Ok(())
}
