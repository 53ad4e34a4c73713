mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Transport};
use dbgstack_adapters::Adapter;
use dbgstack_bridge::{Bridge, PubTerminal, Scheduler};
use dbgstack_core::{build_stack, LayerRegistry, Shutdown};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::initialize_logging(args.log);

    let registry = LayerRegistry::with_builtins();
    // `pubterm` is an opt-in registry entry (a sibling PUB endpoint
    // republishing non-debug bytes) rather than a builtin, since it needs a
    // broadcast channel wired up before any layer using it is built.
    let pubterm = PubTerminal::new();
    pubterm.register(&registry);
    let stack = build_stack(&args.stack, &registry).context("building stack from description")?;

    let boot_drop = Duration::from_secs_f64(args.boot_drop.max(0.0));

    let (adapter, shared, _child) = match args.transport {
        Transport::Stdio => {
            let transport = dbgstack_adapters::stdio::stdio_transport();
            let (adapter, shared) = Adapter::spawn(transport, stack, boot_drop);
            (adapter, shared, None)
        }
        Transport::Serial { path, baud } => {
            let transport = dbgstack_adapters::serial::open_serial(&path, baud)
                .with_context(|| format!("opening serial port {path:?}"))?;
            let (adapter, shared) = Adapter::spawn(transport, stack, boot_drop);
            (adapter, shared, None)
        }
        Transport::Process { command, args: proc_args } => {
            let mut cmd = tokio::process::Command::new(&command);
            cmd.args(&proc_args);
            let (child, transport) =
                dbgstack_adapters::process::spawn_process(cmd).with_context(|| format!("spawning {command:?}"))?;
            let (adapter, shared) = Adapter::spawn(transport, stack, boot_drop);
            (adapter, shared, Some(child))
        }
    };

    let request_deadline = if args.request_deadline > 0.0 {
        Some(Duration::from_secs_f64(args.request_deadline))
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let bridge = Bridge::bind(&args.addr, args.port, shared.clone(), shutdown.clone(), request_deadline)
        .await
        .context("binding request/reply bridge")?;
    tracing::info!(addr = %bridge.local_addr(), "bridge listening");

    // The sibling PUB endpoint only makes sense when the stack actually uses
    // `pubterm` somewhere; binding it unconditionally would hold a port open
    // that nothing ever publishes to.
    let pubterm_server = if args.stack.split(',').any(|entry| entry.trim().starts_with("pubterm")) {
        let server = pubterm
            .listen(&args.addr, args.port + 1, shutdown.clone())
            .await
            .context("binding pubterm side-channel")?;
        tracing::info!(addr = %server.local_addr(), "pubterm side-channel listening");
        Some(server)
    } else {
        None
    };

    let interval = Duration::from_secs_f64(if args.timeout > 0.0 {
        args.timeout
    } else {
        dbgstack_bridge::DEFAULT_INTERVAL.as_secs_f64()
    });
    let scheduler = Scheduler::spawn(shared.clone(), interval, shutdown.clone());

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown requested");
    shutdown.shut_down();

    bridge.close().await;
    scheduler.join().await;
    adapter.join().await;
    if let Some(server) = pubterm_server {
        server.join().await;
    }

    Ok(())
}
