use threadloop::wake::CondvarWake;
use threadloop::{AutoResetEvent, LoopError, LoopState, ManualResetEvent, MessageLoop};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_get_current() {
    thread::spawn(|| {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        assert_eq!(message_loop.state(), LoopState::Idle);
        assert!(message_loop.task_runner().runs_tasks_on_current_thread());
    })
    .join()
    .unwrap();
}

#[test]
fn test_different_threads_have_different_loops() {
    let (transmitter, receiver) = mpsc::channel();
    let release = Arc::new(ManualResetEvent::new());

    let threads: Vec<_> = (0..2)
        .map(|_| {
            let transmitter = transmitter.clone();
            let release = release.clone();
            thread::spawn(move || {
                MessageLoop::ensure_initialized_for_current_thread().unwrap();
                transmitter.send(MessageLoop::current().id()).unwrap();
                release.wait();
            })
        })
        .collect();

    let first = receiver.recv().unwrap();
    let second = receiver.recv().unwrap();
    assert_ne!(first, second);

    release.signal();
    for handle in threads {
        handle.join().unwrap();
    }
}

#[test]
fn test_can_run_and_terminate() {
    let terminated = Arc::new(AtomicBool::new(false));
    let flag = terminated.clone();

    let started = thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();

        message_loop.task_runner().post_task(move || {
            MessageLoop::current().terminate();
            flag.store(true, Ordering::SeqCst);
        });

        message_loop.run().unwrap();
        assert_eq!(message_loop.state(), LoopState::Stopped);
        true
    })
    .join()
    .unwrap();

    assert!(started);
    assert!(terminated.load(Ordering::SeqCst));
}

#[test]
fn test_non_delayed_tasks_are_run_in_order() {
    const COUNT: usize = 100;

    let current = Arc::new(AtomicUsize::new(0));
    let counter = current.clone();

    thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();

        for i in 0..COUNT {
            let counter = counter.clone();
            message_loop.task_runner().post_task(move || {
                assert_eq!(counter.load(Ordering::SeqCst), i);
                counter.fetch_add(1, Ordering::SeqCst);
                if i + 1 == COUNT {
                    MessageLoop::current().terminate();
                }
            });
        }

        message_loop.run().unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(current.load(Ordering::SeqCst), COUNT);
}

#[test]
fn test_delayed_tasks_at_same_time_are_run_in_order() {
    const COUNT: usize = 100;

    let current = Arc::new(AtomicUsize::new(0));
    let counter = current.clone();

    thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        let target = Instant::now() + Duration::from_millis(2);

        for i in 0..COUNT {
            let counter = counter.clone();
            message_loop.task_runner().post_task_for_time(
                move || {
                    assert_eq!(counter.load(Ordering::SeqCst), i);
                    counter.fetch_add(1, Ordering::SeqCst);
                    if i + 1 == COUNT {
                        MessageLoop::current().terminate();
                    }
                },
                target,
            );
        }

        message_loop.run().unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(current.load(Ordering::SeqCst), COUNT);
}

#[test]
fn test_runs_tasks_on_current_thread_only_on_owner() {
    let (transmitter, receiver) = mpsc::channel();
    let release = Arc::new(AutoResetEvent::new());
    let owner_release = release.clone();

    let owner = thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let runner = MessageLoop::current().task_runner();
        transmitter.send(runner.clone()).unwrap();

        assert!(runner.runs_tasks_on_current_thread());
        owner_release.wait();
        assert!(runner.runs_tasks_on_current_thread());
    });

    let runner = receiver.recv().unwrap();

    let observers: Vec<_> = (0..4)
        .map(|_| {
            let runner = runner.clone();
            thread::spawn(move || runner.runs_tasks_on_current_thread())
        })
        .collect();

    for observer in observers {
        assert!(!observer.join().unwrap());
    }
    assert!(!runner.runs_tasks_on_current_thread());

    release.signal();
    owner.join().unwrap();
}

#[test]
fn test_task_observer_fire() {
    const COUNT: usize = 25;

    let (task_count, observer_count) = thread::spawn(|| {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();

        let task_count = Arc::new(AtomicUsize::new(0));
        let observer_count = Arc::new(AtomicUsize::new(0));

        for i in 0..COUNT {
            let task_count = task_count.clone();
            message_loop.task_runner().post_task(move || {
                assert_eq!(task_count.load(Ordering::SeqCst), i);
                task_count.fetch_add(1, Ordering::SeqCst);
                if i + 1 == COUNT {
                    MessageLoop::current().terminate();
                }
            });
        }

        let observed = observer_count.clone();
        message_loop.add_task_observer(0, move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        message_loop.run().unwrap();

        (
            task_count.load(Ordering::SeqCst),
            observer_count.load(Ordering::SeqCst),
        )
    })
    .join()
    .unwrap();

    assert_eq!(task_count, COUNT);
    assert_eq!(observer_count, COUNT);
}

#[test]
fn test_removed_task_observer_stops_firing() {
    let fired = thread::spawn(|| {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        let fired = Arc::new(AtomicUsize::new(0));

        let observed = fired.clone();
        message_loop.add_task_observer(42, move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        let runner = message_loop.task_runner();
        runner.post_task(|| {});
        runner.post_task(|| MessageLoop::current().remove_task_observer(42));
        runner.post_task(|| {});
        runner.post_task(|| MessageLoop::current().terminate());

        message_loop.run().unwrap();
        fired.load(Ordering::SeqCst)
    })
    .join()
    .unwrap();

    // The observer fires after the first task only; it is removed before
    // it would fire for the second.
    assert_eq!(fired, 1);
}

#[test]
fn test_loop_runs_only_once() {
    thread::spawn(|| {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();

        message_loop
            .task_runner()
            .post_task(|| MessageLoop::current().terminate());
        message_loop.run().unwrap();

        assert!(matches!(
            message_loop.run(),
            Err(LoopError::InvalidState {
                expected: LoopState::Idle,
                found: LoopState::Stopped,
            })
        ));
    })
    .join()
    .unwrap();
}

#[test]
fn test_terminate_from_another_thread() {
    let (transmitter, receiver) = mpsc::channel();

    let owner = thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        transmitter.send(message_loop.task_runner()).unwrap();

        message_loop.run().unwrap();
        message_loop.state()
    });

    let runner = receiver.recv().unwrap();
    thread::sleep(Duration::from_millis(10));
    runner.terminate();
    runner.terminate();

    assert_eq!(owner.join().unwrap(), LoopState::Stopped);
}

#[test]
fn test_cross_thread_posts_keep_producer_order() {
    let (transmitter, receiver) = mpsc::channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();

    let owner = thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        transmitter.send(message_loop.task_runner()).unwrap();
        message_loop.run().unwrap();
    });

    let runner = receiver.recv().unwrap();

    for i in 0..50 {
        let log = seen.clone();
        runner.post_task(move || log.lock().unwrap().push(i));
    }
    runner.post_task(|| MessageLoop::current().terminate());

    owner.join().unwrap();
    assert_eq!(*log.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_post_after_teardown_drops_task() {
    let (transmitter, receiver) = mpsc::channel();

    thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        transmitter.send(message_loop.task_runner()).unwrap();
        message_loop.terminate();
        message_loop.run().unwrap();
    })
    .join()
    .unwrap();

    let runner = receiver.recv().unwrap();
    let payload = Arc::new(());
    let captured = payload.clone();

    runner.post_task(move || drop(captured));
    runner.post_delayed_task(|| {}, Duration::from_millis(1));
    runner.terminate();

    assert_eq!(Arc::strong_count(&payload), 1);
}

#[test]
fn test_pending_tasks_are_dropped_with_the_loop() {
    let payload = Arc::new(());
    let captured = payload.clone();

    thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        let runner = message_loop.task_runner();

        runner.post_delayed_task(move || drop(captured), Duration::from_secs(3600));
        runner.post_task(|| MessageLoop::current().terminate());

        message_loop.run().unwrap();
        assert_eq!(message_loop.pending_task_count(), 1);
    })
    .join()
    .unwrap();

    assert_eq!(Arc::strong_count(&payload), 1);
}

#[test]
fn test_run_now_or_post_task() {
    let (transmitter, receiver) = mpsc::channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();

    let owner = thread::spawn(move || {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        let runner = message_loop.task_runner();

        let log = seen.clone();
        runner.run_now_or_post_task(move || log.lock().unwrap().push("inline"));
        assert_eq!(message_loop.pending_task_count(), 0);

        transmitter.send(runner).unwrap();

        message_loop.run().unwrap();
    });

    let runner = receiver.recv().unwrap();
    let log_posted = log.clone();
    runner.run_now_or_post_task(move || {
        log_posted.lock().unwrap().push("posted");
        MessageLoop::current().terminate();
    });

    owner.join().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["inline", "posted"]);
}

#[test]
fn test_current_without_initialization_panics() {
    let result = thread::spawn(|| MessageLoop::current().id()).join();
    assert!(result.is_err());
}

#[test]
fn test_huge_delay_stays_pending() {
    let pending = thread::spawn(|| {
        MessageLoop::ensure_initialized_for_current_thread().unwrap();
        let message_loop = MessageLoop::current();
        let runner = message_loop.task_runner();

        runner.post_delayed_task(|| panic!("must never become due"), Duration::MAX);
        runner.post_delayed_task(|| {}, Duration::from_secs(u64::MAX));
        runner.post_task(|| MessageLoop::current().terminate());

        message_loop.run().unwrap();
        message_loop.pending_task_count()
    })
    .join()
    .unwrap();

    assert_eq!(pending, 2);
}

#[test]
fn test_failed_wake_creation_leaves_thread_without_loop() {
    thread::spawn(|| {
        let result = MessageLoop::builder()
            .wake_with(|| -> std::io::Result<CondvarWake> {
                Err(std::io::Error::other("out of descriptors"))
            })
            .install();

        match result {
            Err(LoopError::WakeCreation(source)) => {
                assert_eq!(source.to_string(), "out of descriptors");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!MessageLoop::is_initialized_for_current_thread());

        let retried = std::panic::catch_unwind(|| MessageLoop::current().id());
        assert!(retried.is_err());
    })
    .join()
    .unwrap();
}
