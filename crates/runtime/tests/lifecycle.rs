// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Integration tests for actor startup, close and failure handling

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use parking_lot::Mutex;
use weaver_runtime::{
	Actor, ActorControl, ActorHandle, ActorState, Error, MockClock, Result, Scheduler,
};
use weaver_testing::init_test_logging;

type Log = Arc<Mutex<Vec<String>>>;

fn controlled_scheduler() -> Scheduler {
	init_test_logging();
	let scheduler = Scheduler::builder().clock(MockClock::new()).cpu_threads(1).io_threads(0).controlled().build();
	scheduler.start().unwrap();
	scheduler
}

#[derive(Default)]
struct Recorder {
	log: Log,
	fail_on_start: bool,
	fail_on_close: bool,
}

impl Recorder {
	fn new(log: &Log) -> Self {
		Self {
			log: log.clone(),
			..Default::default()
		}
	}

	fn record(&self, entry: &str) {
		self.log.lock().push(entry.to_string());
	}
}

impl Actor for Recorder {
	fn on_start(&mut self, _ctl: &ActorControl<Self>) -> Result<()> {
		self.record("start");
		if self.fail_on_start {
			return Err(Error::job("start refused"));
		}
		Ok(())
	}

	fn on_close(&mut self, _ctl: &ActorControl<Self>) -> Result<()> {
		self.record("close");
		if self.fail_on_close {
			return Err(Error::job("close refused"));
		}
		Ok(())
	}

	fn on_failure(&mut self, error: &Error) {
		self.log.lock().push(format!("failure: {error}"));
	}
}

fn record_job(handle: &ActorHandle<Recorder>, entry: &'static str) {
	handle
		.run(move |actor, _| {
			actor.record(entry);
			Ok(())
		})
		.unwrap();
}

#[test]
fn test_start_completes_after_on_start() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();

	assert_eq!(handle.state(), ActorState::Starting);
	assert!(!handle.started().is_done());

	scheduler.work_until_idle();

	assert_eq!(handle.started().try_get(), Some(Ok(())));
	assert_eq!(handle.state(), ActorState::Started);
	assert_eq!(*log.lock(), vec!["start"]);
}

#[test]
fn test_jobs_run_in_submission_order() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();

	record_job(&handle, "a");
	record_job(&handle, "b");
	handle
		.run(|actor, ctl| {
			actor.record("c");
			ctl.run(|actor, _| {
				actor.record("self");
				Ok(())
			})
		})
		.unwrap();
	record_job(&handle, "d");

	scheduler.work_until_idle();
	assert_eq!(*log.lock(), vec!["start", "a", "b", "c", "d", "self"]);
}

#[test]
fn test_close_drains_self_scheduled_work_first() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	scheduler.work_until_idle();

	handle
		.run(|actor, ctl| {
			actor.record("job");
			ctl.run(|actor, ctl| {
				actor.record("follow-up");
				ctl.run(|actor, _| {
					actor.record("follow-up-2");
					Ok(())
				})
			})
		})
		.unwrap();
	let closed = handle.close();
	assert_eq!(handle.state(), ActorState::CloseRequested);

	scheduler.work_until_idle();

	assert_eq!(closed.try_get(), Some(Ok(())));
	assert_eq!(handle.state(), ActorState::Closed);
	assert_eq!(*log.lock(), vec!["start", "job", "follow-up", "follow-up-2", "close"]);
}

#[test]
fn test_close_is_idempotent() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	scheduler.work_until_idle();

	let first = handle.close();
	let second = scheduler.close(&handle);
	scheduler.work_until_idle();
	let third = handle.close();

	for closed in [first, second, third] {
		assert_eq!(closed.try_get(), Some(Ok(())));
	}
	assert_eq!(log.lock().iter().filter(|entry| *entry == "close").count(), 1);
}

#[test]
fn test_close_requested_while_starting() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();

	let closed = handle.close();
	assert!(matches!(handle.run(|_, _| Ok(())), Err(Error::SchedulingRejected { .. })));

	scheduler.work_until_idle();

	assert_eq!(handle.started().try_get(), Some(Ok(())));
	assert_eq!(closed.try_get(), Some(Ok(())));
	assert_eq!(*log.lock(), vec!["start", "close"]);
}

#[test]
fn test_submissions_rejected_after_close() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	scheduler.work_until_idle();

	handle.close();
	let rejected = handle.run(|_, _| Ok(()));
	assert!(matches!(rejected, Err(Error::SchedulingRejected { .. })));

	let call = handle.call(|_, _| Ok(1u32));
	assert!(matches!(call.try_get(), Some(Err(Error::SchedulingRejected { .. }))));

	scheduler.work_until_idle();
	assert!(matches!(handle.run(|_, _| Ok(())), Err(Error::SchedulingRejected { .. })));
}

#[test]
fn test_pending_timers_cancelled_on_close() {
	init_test_logging();
	let clock = MockClock::new();
	let scheduler = Scheduler::builder().clock(clock).cpu_threads(1).controlled().build();
	scheduler.start().unwrap();

	let fired = Arc::new(AtomicUsize::new(0));
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();

	let fired_clone = fired.clone();
	let timer = handle.call(move |_, ctl| {
		Ok(ctl.schedule(Duration::from_millis(100), move |_, _| {
			fired_clone.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}))
	});
	scheduler.work_until_idle();
	let timer = timer.try_get().unwrap().unwrap();
	assert!(timer.is_armed());

	handle.close();
	scheduler.work_until_idle();
	assert!(timer.is_cancelled());

	scheduler.advance(Duration::from_millis(500)).unwrap();
	assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failing_job_drains_queue_and_fails_linked_futures() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	scheduler.work_until_idle();

	let failing = handle.call(|_, _| -> Result<u32> { Err(Error::job("boom")) });
	let queued = handle.call(|actor, _| {
		actor.record("never");
		Ok(7u32)
	});
	let closed = handle.closed();

	scheduler.work_until_idle();

	assert_eq!(failing.try_get(), Some(Err(Error::job("boom"))));
	assert_eq!(queued.try_get(), Some(Err(Error::job("boom"))));
	assert_eq!(closed.try_get(), Some(Err(Error::job("boom"))));
	assert_eq!(handle.state(), ActorState::Failed);
	assert_eq!(*log.lock(), vec!["start", "failure: boom", "close"]);

	let rejected = handle.run(|_, _| Ok(()));
	assert!(matches!(rejected, Err(Error::SchedulingRejected { .. })));
}

#[test]
fn test_panicking_job_becomes_task_failure() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();

	let result = handle.call(|_, _| -> Result<()> { panic!("index out of range") });
	scheduler.work_until_idle();

	assert_eq!(
		result.try_get(),
		Some(Err(Error::ActorTaskFailure {
			actor: "Recorder".to_string(),
			reason: "index out of range".to_string(),
		}))
	);
	assert_eq!(handle.state(), ActorState::Failed);
}

#[test]
fn test_failure_is_isolated_to_one_actor() {
	let scheduler = controlled_scheduler();
	let broken_log = Log::default();
	let healthy_log = Log::default();
	let broken = scheduler.submit(Recorder::new(&broken_log)).unwrap();
	let healthy = scheduler.submit(Recorder::new(&healthy_log)).unwrap();

	broken.run(|_, _| Err(Error::job("broken"))).unwrap();
	record_job(&healthy, "still running");
	scheduler.work_until_idle();

	assert_eq!(broken.state(), ActorState::Failed);
	assert_eq!(healthy.state(), ActorState::Started);
	assert_eq!(*healthy_log.lock(), vec!["start", "still running"]);
}

#[test]
fn test_failed_start_fails_startup_future() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler
		.submit(Recorder {
			fail_on_start: true,
			..Recorder::new(&log)
		})
		.unwrap();

	scheduler.work_until_idle();

	assert_eq!(handle.started().try_get(), Some(Err(Error::job("start refused"))));
	assert_eq!(handle.close().try_get(), Some(Err(Error::job("start refused"))));
	assert_eq!(*log.lock(), vec!["start", "failure: start refused", "close"]);
}

#[test]
fn test_failure_while_closing_skips_second_close() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler
		.submit(Recorder {
			fail_on_close: true,
			..Recorder::new(&log)
		})
		.unwrap();
	scheduler.work_until_idle();

	let closed = handle.close();
	scheduler.work_until_idle();

	assert_eq!(closed.try_get(), Some(Err(Error::job("close refused"))));
	assert_eq!(handle.state(), ActorState::Failed);
	assert_eq!(*log.lock(), vec!["start", "close", "failure: close refused"]);
}

#[test]
fn test_fatal_error_reaches_fatal_handler() {
	init_test_logging();
	let raised = Arc::new(Mutex::new(Vec::new()));
	let raised_clone = raised.clone();
	let scheduler = Scheduler::builder()
		.clock(MockClock::new())
		.cpu_threads(1)
		.controlled()
		.fatal_handler(move |actor: &str, err: &Error| raised_clone.lock().push((actor.to_string(), err.clone())))
		.build();
	scheduler.start().unwrap();

	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	handle.run(|_, _| Err(Error::Fatal("out of file descriptors".into()))).unwrap();
	scheduler.work_until_idle();

	assert_eq!(*raised.lock(), vec![("Recorder".to_string(), Error::Fatal("out of file descriptors".into()))]);
	assert_eq!(handle.state(), ActorState::Failed);
}

#[test]
fn test_stop_rejects_new_work() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	scheduler.work_until_idle();

	scheduler.stop();
	assert!(!scheduler.is_running());

	assert!(matches!(scheduler.submit(Recorder::new(&log)), Err(Error::SchedulingRejected { .. })));
	assert!(matches!(handle.run(|_, _| Ok(())), Err(Error::SchedulingRejected { .. })));
	assert!(matches!(scheduler.start(), Err(Error::SchedulingRejected { .. })));
}

#[test]
fn test_stop_drains_queued_jobs() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	record_job(&handle, "queued");

	scheduler.stop();
	assert_eq!(*log.lock(), vec!["start", "queued"]);
}

#[test]
fn test_stop_fails_futures_of_never_started_scheduler() {
	init_test_logging();
	let scheduler = Scheduler::builder().cpu_threads(1).io_threads(0).build();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	let started = handle.started();
	let answer = handle.call(|_, _| Ok(42));

	scheduler.stop();

	let rejected = Error::rejected("scheduler is stopped");
	assert_eq!(started.join_timeout(Duration::from_secs(5)), Err(rejected.clone()));
	assert_eq!(answer.join_timeout(Duration::from_secs(5)), Err(rejected.clone()));
	assert_eq!(handle.closed().try_get(), Some(Err(rejected)));
	assert_eq!(handle.state(), ActorState::Failed);
	assert!(log.lock().is_empty());
}

#[test]
fn test_close_after_threaded_stop_is_settled() {
	init_test_logging();
	let scheduler = Scheduler::builder().cpu_threads(1).io_threads(0).build();
	scheduler.start().unwrap();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	handle.started().join_timeout(Duration::from_secs(5)).unwrap();

	scheduler.stop();

	let closed = handle.close();
	assert_eq!(closed.join_timeout(Duration::from_secs(5)), Err(Error::rejected("scheduler is stopped")));
	assert_eq!(*log.lock(), vec!["start"]);
}

#[test]
fn test_closed_actor_is_not_abandoned_on_stop() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	handle.close();
	scheduler.work_until_idle();

	scheduler.stop();

	assert_eq!(handle.closed().try_get(), Some(Ok(())));
	assert_eq!(handle.state(), ActorState::Closed);
}

#[test]
fn test_actor_runs_after_handle_is_dropped() {
	let scheduler = controlled_scheduler();
	let log = Log::default();
	let handle = scheduler.submit(Recorder::new(&log)).unwrap();
	record_job(&handle, "queued");
	let closed = handle.close();
	drop(handle);

	scheduler.work_until_idle();

	assert_eq!(closed.try_get(), Some(Ok(())));
	assert_eq!(*log.lock(), vec!["start", "queued", "close"]);
}
