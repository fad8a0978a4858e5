/*!
 * Scheduler Tests
 * Policy passes, quantum accounting, WAIT parking, and shutdown
 */

use os_sim::bytecode::{encode, Instructions, Opcode};
use os_sim::process::{ExitReason, Process, ProcessFactory, ProcessState};
use os_sim::{MemoryManager, Policy, Scheduler};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn program(parts: &[(Opcode, &[u32])]) -> Instructions {
    let mut program = Instructions::new();
    for (op, operands) in parts {
        program.append(encode(*op, operands));
    }
    program
}

fn calc_process(factory: &ProcessFactory, name: &str, countdown: u32) -> Process {
    factory.create(
        name,
        u64::from(countdown),
        4,
        program(&[(Opcode::Calc, &[countdown]), (Opcode::Nop, &[])]),
        0,
        None,
    )
}

/// A `[CALC 3, NOP]` stream under round-robin with a one-cycle quantum
/// takes three scheduling passes to finish
#[test]
fn round_robin_single_cycle_quantum_takes_three_passes() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(1)
        .factory(Arc::clone(&factory))
        .build();
    let registry = scheduler.registry();

    let proc = calc_process(&factory, "calc3", 3);
    let pid = proc.pid;
    tx.send(proc).unwrap();

    scheduler.pass();
    assert_eq!(registry.get(&pid).unwrap().state, ProcessState::Ready);
    assert_eq!(*scheduler.ready_snapshot().read(), vec![pid]);
    scheduler.pass();
    assert_eq!(registry.get(&pid).unwrap().state, ProcessState::Ready);
    scheduler.pass();

    let row = registry.get(&pid).unwrap();
    assert_eq!(row.state, ProcessState::Terminated);
    assert_eq!(row.exit, Some(ExitReason::Completed));
    assert_eq!(scheduler.stats().completed, 1);
    assert_eq!(scheduler.stats().preemptions, 2);
    assert!(scheduler.ready_snapshot().read().is_empty());
}

/// A forked child is admitted on the next intake cycle, pointing at the
/// instruction after the fork
#[test]
fn forked_child_is_admitted_within_one_pass() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(100)
        .factory(Arc::clone(&factory))
        .build();
    let registry = scheduler.registry();

    let parent = factory.create(
        "parent",
        10,
        4,
        program(&[
            (Opcode::Nop, &[]),
            (Opcode::Nop, &[]),
            (Opcode::Fork, &[]),
            (Opcode::Nop, &[]),
        ]),
        0,
        None,
    );
    let parent_pid = parent.pid;
    tx.send(parent).unwrap();

    scheduler.pass(); // runs the parent, which forks into the intake
    scheduler.pass(); // admits the child

    let parent_row = registry.get(&parent_pid).unwrap();
    assert_eq!(parent_row.children.len(), 1);

    let child_pid = parent_row.children[0];
    let child_row = registry.get(&child_pid).unwrap();
    assert_eq!(child_row.parent, Some(parent_pid));
}

/// Termination removal swaps with the back of the queue, so round-robin
/// order is only approximate; every process still completes
#[test]
fn round_robin_completes_all_despite_reordering() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(1)
        .factory(Arc::clone(&factory))
        .build();

    tx.send(calc_process(&factory, "short", 1)).unwrap();
    tx.send(calc_process(&factory, "mid", 3)).unwrap();
    tx.send(calc_process(&factory, "long", 5)).unwrap();

    for _ in 0..20 {
        if scheduler.stats().completed == 3 {
            break;
        }
        scheduler.pass();
    }
    assert_eq!(scheduler.stats().completed, 3);
}

/// FCFS runs the head to completion before the next process starts
#[test]
fn fcfs_interleaves_only_at_completion_boundaries() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::Fcfs)
        .factory(Arc::clone(&factory))
        .build();
    let registry = scheduler.registry();

    let first = calc_process(&factory, "first", 3);
    let second = calc_process(&factory, "second", 2);
    let (first_pid, second_pid) = (first.pid, second.pid);
    tx.send(first).unwrap();
    tx.send(second).unwrap();

    scheduler.pass();
    assert_eq!(
        registry.get(&first_pid).unwrap().state,
        ProcessState::Terminated
    );
    assert_eq!(registry.get(&second_pid).unwrap().state, ProcessState::Ready);

    scheduler.pass();
    assert_eq!(
        registry.get(&second_pid).unwrap().state,
        ProcessState::Terminated
    );
}

/// A process that cannot get a frame parks in WAIT and is retried once
/// another process releases memory
#[test]
fn memory_pressure_parks_then_retries() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    // One frame: the two processes contend for it
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(1)
        .factory(Arc::clone(&factory))
        .memory(MemoryManager::new(4, 4, 8))
        .build();
    let registry = scheduler.registry();

    let holder = calc_process(&factory, "holder", 3);
    let starved = calc_process(&factory, "starved", 2);
    let (holder_pid, starved_pid) = (holder.pid, starved.pid);
    tx.send(holder).unwrap();
    tx.send(starved).unwrap();

    scheduler.pass();
    assert_eq!(
        registry.get(&starved_pid).unwrap().state,
        ProcessState::Waiting
    );

    for _ in 0..20 {
        if scheduler.stats().completed == 2 {
            break;
        }
        scheduler.pass();
    }

    assert_eq!(
        registry.get(&holder_pid).unwrap().exit,
        Some(ExitReason::Completed)
    );
    assert_eq!(
        registry.get(&starved_pid).unwrap().exit,
        Some(ExitReason::Completed)
    );
}

/// Closing the intake drains remaining work and stops the scheduler
#[test]
fn intake_closure_is_a_clean_shutdown() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);
    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(10)
        .factory(Arc::clone(&factory))
        .build();

    tx.send(calc_process(&factory, "tail", 2)).unwrap();
    drop(tx);

    let mut passes = 0;
    while scheduler.pass() {
        passes += 1;
        assert!(passes < 20, "scheduler failed to drain");
    }

    assert_eq!(scheduler.stats().completed, 1);
}

/// A waiter that can never be unblocked is failed at shutdown instead of
/// hanging the drain
#[test]
fn stranded_waiters_fault_on_shutdown() {
    let factory = Arc::new(ProcessFactory::new(4));
    let (tx, rx) = flume::bounded(16);

    // The only frame is pinned by an owner the scheduler never runs
    let mut memory = MemoryManager::new(4, 4, 8);
    let pinned = memory.reserve(4, 999);
    memory.resolve(pinned[0]).unwrap();

    let mut scheduler = Scheduler::builder(tx.clone(), rx)
        .policy(Policy::RoundRobin)
        .quantum(1)
        .factory(Arc::clone(&factory))
        .memory(memory)
        .build();
    let registry = scheduler.registry();

    let starved = calc_process(&factory, "starved", 2);
    let starved_pid = starved.pid;
    tx.send(starved).unwrap();
    drop(tx);

    let mut passes = 0;
    while scheduler.pass() {
        passes += 1;
        assert!(passes < 20, "scheduler failed to drain");
    }

    let row = registry.get(&starved_pid).unwrap();
    assert_eq!(row.state, ProcessState::Terminated);
    assert_eq!(row.exit, Some(ExitReason::Faulted));
}
