// main.rs: orchestration only.
// Every platform quirk lives in the modules below; main.rs is the only file that wires them together.
mod args;
mod config;
mod context;
mod engine;
mod environment;
mod gui;
mod latch;
mod lifecycle;
mod logging;
mod revision;
mod sources;
mod workdir;

use std::sync::Arc;

use args::normalize_args;
use config::boot_config;
use context::LaunchContext;
use engine::ProcessEngine;
use gui::{HeadlessDock, SystemBrowser};
use lifecycle::{wants_dual_role, LifecycleCoordinator};
use sources::select_source_paths;
use workdir::WorkDirResolver;

fn main() -> anyhow::Result<()> {
    let config = boot_config()?;
    logging::init(&config.log_filter);

    let ctx = LaunchContext::detect();
    let work_dir = match &config.work_dir_override {
        Some(dir) => dir.clone(),
        None => WorkDirResolver::new(&config.home_dir, &config.support_dir).resolve(&ctx),
    };
    tracing::info!(
        work_dir = %work_dir.display(),
        packaged = ctx.is_packaged,
        platform = ctx.platform.name(),
        "bootstrap"
    );

    let sources = select_source_paths(&work_dir, &ctx);
    let prepared = environment::prepare(&ctx, &work_dir, std::env::args_os().collect());
    tracing::debug!(
        log_file = ?prepared.log_file,
        cert_bundle = ?prepared.cert_bundle,
        "environment prepared"
    );

    // A bare dock launch runs the engine in the background and keeps the main
    // thread for the dock; the browser is opened by the dock instead.
    let dual_role = wants_dual_role(ctx.platform, &prepared.args, config.force_single_role);
    let args = normalize_args(&prepared.args, &ctx, !dual_role);
    tracing::debug!(
        argv = ?args.tokens(),
        user_args = ?args.user_args(),
        dual_role,
        "engine arguments"
    );

    let engine = Arc::new(ProcessEngine::locate(&config, sources)?);
    let mut coordinator = LifecycleCoordinator::new(
        engine,
        HeadlessDock,
        Arc::new(SystemBrowser),
        config.interactive_session,
    );

    coordinator.install_termination_handler()?;

    if dual_role {
        coordinator.run_dual(args)?;
    } else {
        coordinator.run_single(&args)?;
    }
    tracing::debug!(state = ?coordinator.state(), "lifecycle finished");
    Ok(())
}
