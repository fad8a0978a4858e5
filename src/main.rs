/*!
 * os-sim - Main Entry Point
 *
 * Interactive shell over the simulator core:
 * - inject synthetic or template-driven processes
 * - inspect the process registry and memory occupancy
 * - disassemble template programs
 */

use anyhow::{Context, Result};
use log::info;
use os_sim::bytecode::{encode, Opcode};
use os_sim::process::{spawn_variants, Template};
use os_sim::{
    Clock, Instructions, Mailboxes, MemoryManager, ProcessFactory, Scheduler, SimConfig,
};
use rand::Rng;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

fn main() -> Result<()> {
    env_logger::init();

    let config = SimConfig::from_env();
    info!("os-sim starting");
    info!(
        "configuration: {} frames of {} bytes, {} policy, quantum {} cycles",
        config.frame_capacity(),
        config.page_size,
        config.policy,
        config.quantum
    );

    let clock = Arc::new(Clock::new());
    let factory = Arc::new(ProcessFactory::new(config.mailbox_count));
    let mailboxes = Arc::new(Mailboxes::new(
        config.mailbox_count,
        config.mailbox_capacity,
    ));
    let memory = MemoryManager::with_config(&config);
    let memory_stats = memory.stats_handle();

    let (intake_tx, intake_rx) = flume::bounded(config.intake_capacity);

    let scheduler = Scheduler::builder(intake_tx.clone(), intake_rx)
        .policy(config.policy)
        .quantum(config.quantum)
        .clock(Arc::clone(&clock))
        .factory(Arc::clone(&factory))
        .mailboxes(Arc::clone(&mailboxes))
        .memory(memory)
        .build();

    let registry = scheduler.registry();
    let scheduler_stats = scheduler.stats_handle();
    let ready_queue = scheduler.ready_snapshot();

    let worker = thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || scheduler.run())
        .context("failed to spawn the scheduler thread")?;

    println!("os-sim shell");
    println!("---------------------");
    println!("commands: new, load <file> <n>, ps, mem, stats, dis <file>, exit");

    let stdin = io::stdin();
    let mut rng = rand::thread_rng();

    loop {
        print!("==> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let mut fields = line.split_whitespace();

        match fields.next() {
            Some("new") => {
                let runtime = rng.gen_range(1..=500);
                let memory = rng.gen_range(1..=1024);
                let process = factory.create(
                    "synthetic",
                    runtime,
                    memory,
                    synthetic_program(runtime),
                    0,
                    None,
                );
                let pid = process.pid;
                if intake_tx.send(process).is_err() {
                    println!("scheduler is gone");
                    break;
                }
                println!(
                    "queued process {} (runtime {}, memory {})",
                    pid, runtime, memory
                );
            }
            Some("load") => match (fields.next(), fields.next()) {
                (Some(path), count) => {
                    let count = count.and_then(|c| c.parse().ok()).unwrap_or(1);
                    match Template::load(path) {
                        Ok(template) => {
                            match spawn_variants(&factory, &template, count, &intake_tx, &mut rng)
                            {
                                Ok(spawned) => println!("queued {} processes", spawned),
                                Err(err) => println!("load failed: {}", err),
                            }
                        }
                        Err(err) => println!("load failed: {}", err),
                    }
                }
                _ => println!("usage: load <file> <n>"),
            },
            Some("ps") => {
                let mut rows: Vec<_> = registry.iter().map(|r| r.value().clone()).collect();
                rows.sort_by_key(|row| row.pid);
                for row in rows {
                    let exit = row
                        .exit
                        .map(|reason| format!(" ({:?})", reason))
                        .unwrap_or_default();
                    println!(
                        "{:>5}  {:<24} {:<10} runtime={:<6} mem={:<6} pages={}{}",
                        row.pid, row.name, row.state.to_string(), row.runtime, row.memory,
                        row.pages, exit
                    );
                }
            }
            Some("mem") => {
                println!("{}", serde_json::to_string_pretty(&memory_stats.snapshot())?);
            }
            Some("stats") => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&scheduler_stats.snapshot())?
                );
                println!("ready queue: {:?}", *ready_queue.read());
                println!("cycles: {}", clock.total());
            }
            Some("dis") => match fields.next() {
                Some(path) => match Template::load(path).and_then(|t| t.assemble()) {
                    Ok((program, runtime)) => {
                        print!("{}", program);
                        println!("; runtime budget {} cycles", runtime);
                    }
                    Err(err) => println!("disassembly failed: {}", err),
                },
                None => println!("usage: dis <file>"),
            },
            Some("exit") => break,
            Some(other) => println!("unknown command {:?}", other),
            None => {}
        }
    }

    println!("exiting simulator");
    drop(intake_tx);
    worker
        .join()
        .map_err(|_| anyhow::anyhow!("scheduler thread panicked"))?;
    Ok(())
}

/// CALC bursts covering the runtime budget, capped per instruction by
/// the one-byte countdown operand
fn synthetic_program(runtime: u64) -> Instructions {
    let mut program = Instructions::new();
    let mut remaining = runtime;
    while remaining > 0 {
        let burst = remaining.min(u64::from(u8::MAX));
        program.append(encode(Opcode::Calc, &[burst as u32]));
        remaining -= burst;
    }
    program.append(encode(Opcode::Exe, &[]));
    program
}
