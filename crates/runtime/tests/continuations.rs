// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Integration tests for futures crossing actor boundaries

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use weaver_runtime::{
	Actor, ActorCondition, ActorFuture, Error, MockClock, Result, Scheduler, traverse_sequential,
};
use weaver_testing::init_test_logging;

fn controlled_scheduler() -> Scheduler {
	init_test_logging();
	let scheduler = Scheduler::builder().clock(MockClock::new()).cpu_threads(1).io_threads(0).controlled().build();
	scheduler.start().unwrap();
	scheduler
}

#[derive(Default)]
struct Collector {
	value: u64,
	outcomes: Vec<Result<u64>>,
	all_done: Vec<Option<Error>>,
	flushes: usize,
}

impl Actor for Collector {}

#[test]
fn test_run_on_completion_resumes_actor() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let pending: ActorFuture<u64> = ActorFuture::new();
	let awaited = pending.clone();
	handle
		.run(move |_, ctl| {
			ctl.run_on_completion(&awaited, |actor, _, outcome| {
				actor.outcomes.push(outcome);
				Ok(())
			});
			Ok(())
		})
		.unwrap();
	scheduler.work_until_idle();

	// Nothing runs until the future settles.
	let outcomes = handle.call(|actor, _| Ok(actor.outcomes.len()));
	scheduler.work_until_idle();
	assert_eq!(outcomes.try_get(), Some(Ok(0)));

	assert!(pending.complete(42));
	scheduler.work_until_idle();

	let outcomes = handle.call(|actor, _| Ok(actor.outcomes.clone()));
	scheduler.work_until_idle();
	assert_eq!(outcomes.try_get(), Some(Ok(vec![Ok(42)])));
}

#[test]
fn test_run_on_completion_receives_failure() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let failed = ActorFuture::failed(Error::job("upstream gone"));
	handle
		.run(move |_, ctl| {
			ctl.run_on_completion(&failed, |actor, _, outcome| {
				actor.outcomes.push(outcome);
				Ok(())
			});
			Ok(())
		})
		.unwrap();
	scheduler.work_until_idle();

	let outcomes = handle.call(|actor, _| Ok(actor.outcomes.clone()));
	scheduler.work_until_idle();
	assert_eq!(outcomes.try_get(), Some(Ok(vec![Err(Error::job("upstream gone"))])));
}

#[test]
fn test_run_on_completion_all_reports_failure() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let futures: Vec<ActorFuture<u64>> = (0..3).map(|_| ActorFuture::new()).collect();
	let awaited = futures.clone();
	handle
		.run(move |_, ctl| {
			ctl.run_on_completion_all(awaited, |actor, _, error| {
				actor.all_done.push(error);
				Ok(())
			});
			ctl.run_on_completion_all(Vec::<ActorFuture<u64>>::new(), |actor, _, error| {
				actor.all_done.push(error);
				Ok(())
			});
			Ok(())
		})
		.unwrap();
	scheduler.work_until_idle();

	futures[0].complete(1);
	futures[2].complete_exceptionally(Error::job("second failed"));
	scheduler.work_until_idle();

	let done = handle.call(|actor, _| Ok(actor.all_done.clone()));
	scheduler.work_until_idle();
	assert_eq!(done.try_get(), Some(Ok(vec![None])));

	futures[1].complete(2);
	scheduler.work_until_idle();

	let done = handle.call(|actor, _| Ok(actor.all_done.clone()));
	scheduler.work_until_idle();
	assert_eq!(done.try_get(), Some(Ok(vec![None, Some(Error::job("second failed"))])));
}

#[test]
fn test_cancel_before_producing_job_runs() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let produced = handle.call(|actor, _| {
		actor.value += 1;
		Ok(actor.value)
	});
	let observed = Arc::new(Mutex::new(Vec::new()));
	let observed_clone = observed.clone();
	produced.on_complete(move |outcome| observed_clone.lock().push(outcome));

	assert!(produced.cancel());
	scheduler.work_until_idle();

	assert_eq!(produced.try_get(), Some(Err(Error::FutureCancelled)));
	assert_eq!(*observed.lock(), vec![Err(Error::FutureCancelled)]);
	assert!(produced.is_cancelled());

	// The job itself still ran; only its result was discarded.
	let value = handle.call(|actor, _| Ok(actor.value));
	scheduler.work_until_idle();
	assert_eq!(value.try_get(), Some(Ok(1)));
}

#[test]
fn test_condition_signals_coalesce() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let condition = handle.call(|_, ctl| {
		Ok(ctl.on_condition("flush", |actor: &mut Collector, _| {
			actor.flushes += 1;
			Ok(())
		}))
	});
	scheduler.work_until_idle();
	let condition: ActorCondition = condition.try_get().unwrap().unwrap();
	assert_eq!(condition.name(), "flush");

	assert!(condition.signal());
	assert!(!condition.signal());
	assert!(!condition.signal());
	scheduler.work_until_idle();

	assert!(condition.signal());
	scheduler.work_until_idle();

	let flushes = handle.call(|actor, _| Ok(actor.flushes));
	scheduler.work_until_idle();
	assert_eq!(flushes.try_get(), Some(Ok(2)));

	handle.close();
	scheduler.work_until_idle();
	assert!(!condition.signal());
}

#[test]
fn test_call_from_one_actor_to_another() {
	let scheduler = controlled_scheduler();
	let callee = scheduler.submit(Collector::default()).unwrap();
	let caller = scheduler.submit(Collector::default()).unwrap();

	let callee_clone = callee.clone();
	caller
		.run(move |_, ctl| {
			let answer = callee_clone.call(|actor, _| {
				actor.value = 7;
				Ok(actor.value * 6)
			});
			ctl.run_on_completion(&answer, |actor, _, outcome| {
				actor.outcomes.push(outcome);
				Ok(())
			});
			Ok(())
		})
		.unwrap();
	scheduler.work_until_idle();

	let outcomes = caller.call(|actor, _| Ok(actor.outcomes.clone()));
	scheduler.work_until_idle();
	assert_eq!(outcomes.try_get(), Some(Ok(vec![Ok(42)])));
}

#[test]
fn test_traverse_sequential_over_actor_calls() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();
	let calls = Arc::new(AtomicUsize::new(0));

	let calls_clone = calls.clone();
	let handle_clone = handle.clone();
	let results = traverse_sequential(vec![1u64, 2, 3], move |step| {
		calls_clone.fetch_add(1, Ordering::SeqCst);
		handle_clone.call(move |actor, _| {
			actor.value += step;
			Ok(actor.value)
		})
	});

	// Only the first call is queued until it completes.
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	scheduler.work_until_idle();

	assert_eq!(results.try_get(), Some(Ok(vec![1, 3, 6])));
	assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_traverse_sequential_stops_at_first_failure() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();
	let calls = Arc::new(AtomicUsize::new(0));

	let calls_clone = calls.clone();
	let handle_clone = handle.clone();
	let results = traverse_sequential(vec![1u64, 0, 3], move |step| {
		calls_clone.fetch_add(1, Ordering::SeqCst);
		handle_clone.call(move |actor, _| {
			if step == 0 {
				return Err(Error::job("zero step"));
			}
			actor.value += step;
			Ok(actor.value)
		})
	});
	scheduler.work_until_idle();

	assert_eq!(results.try_get(), Some(Err(Error::job("zero step"))));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_then_apply_on_actor_maps_with_actor_state() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let source: ActorFuture<u64> = ActorFuture::new();
	let awaited = source.clone();
	let derived = handle.call(move |actor, ctl| {
		actor.value = 10;
		Ok(ctl.then_apply(&awaited, |actor: &mut Collector, _, increment: u64| {
			actor.value += increment;
			Ok(actor.value)
		}))
	});
	scheduler.work_until_idle();
	let derived: ActorFuture<u64> = derived.try_get().unwrap().unwrap();
	assert!(derived.clock().is_mock());

	source.complete(5);
	// The mapping is a job of the actor, so nothing happens until it runs.
	assert!(!derived.is_done());
	scheduler.work_until_idle();

	assert_eq!(derived.try_get(), Some(Ok(15)));
}

#[test]
fn test_then_apply_on_actor_propagates_failure() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let failed: ActorFuture<u64> = ActorFuture::failed(Error::job("no input"));
	let derived = handle.call(move |_, ctl| {
		Ok(ctl.then_apply(&failed, |actor: &mut Collector, _, _: u64| {
			actor.flushes += 1;
			Ok(0u64)
		}))
	});
	scheduler.work_until_idle();
	let derived: ActorFuture<u64> = derived.try_get().unwrap().unwrap();

	assert_eq!(derived.try_get(), Some(Err(Error::job("no input"))));
	let flushes = handle.call(|actor, _| Ok(actor.flushes));
	scheduler.work_until_idle();
	assert_eq!(flushes.try_get(), Some(Ok(0)));
}

#[test]
fn test_panicking_mapper_over_actor_call_fails_chain() {
	let scheduler = controlled_scheduler();
	let handle = scheduler.submit(Collector::default()).unwrap();

	let chained = handle.call(|_, _| Ok(1u64)).then_apply(|_| -> u64 { panic!("mapper failed") });
	scheduler.work_until_idle();

	assert_eq!(chained.try_get(), Some(Err(Error::job("continuation panicked: mapper failed"))));
	// The panic stayed in the continuation; the actor is unaffected.
	let value = handle.call(|actor, _| Ok(actor.value));
	scheduler.work_until_idle();
	assert_eq!(value.try_get(), Some(Ok(0)));
}
