//! Scheduling on tokio: writes drain on the next tick without an explicit
//! `drain()` on a current-thread runtime, with or without a `LocalSet`.

use std::cell::Cell;
use std::rc::Rc;

use arbor_core::{autorun, drain, is_idle, Entity, RuntimeConfig, TickMode};
use tokio::task::{yield_now, LocalSet};

async fn settle() {
    for _ in 0..4 {
        yield_now().await;
    }
}

#[tokio::test]
async fn tokio_driver_drains_on_the_next_tick() {
    let local = LocalSet::new();
    local
        .run_until(async {
            RuntimeConfig {
                tick: TickMode::Tokio,
                ..Default::default()
            }
            .install()
            .unwrap();

            let counter = Entity::new();
            counter.set("count", 1);

            let seen = Rc::new(Cell::new(0.0));
            let (c, seen_clone) = (counter.clone(), seen.clone());
            let _reaction = autorun(move || {
                seen_clone.set(c.get("count").as_f64().unwrap_or_default());
            });

            counter.set("count", 2);
            counter.set("count", 3);
            assert_eq!(seen.get(), 1.0);
            assert!(!is_idle());

            settle().await;
            assert_eq!(seen.get(), 3.0);
            assert!(is_idle());
        })
        .await;
}

#[tokio::test]
async fn cascades_settle_in_a_single_tick() {
    let local = LocalSet::new();
    local
        .run_until(async {
            RuntimeConfig {
                tick: TickMode::Tokio,
                ..Default::default()
            }
            .install()
            .unwrap();

            let source = Entity::with_value(1);
            let doubled = Entity::bound({
                let s = source.clone();
                move || s.get("").as_f64().unwrap_or_default() * 2.0
            });

            let seen = Rc::new(Cell::new(0.0));
            let (d, seen_clone) = (doubled.clone(), seen.clone());
            let _view = autorun(move || {
                seen_clone.set(d.get("").as_f64().unwrap_or_default());
            });
            settle().await;
            assert_eq!(seen.get(), 2.0);

            source.set("", 21);
            settle().await;
            assert_eq!(seen.get(), 42.0);
            assert!(is_idle());
        })
        .await;
}

fn install_tokio_driver() {
    RuntimeConfig {
        tick: TickMode::Tokio,
        ..Default::default()
    }
    .install()
    .unwrap();
}

#[tokio::test]
async fn drains_without_a_local_set() {
    install_tokio_driver();

    let counter = Entity::with_value(1);
    let seen = Rc::new(Cell::new(0.0));
    let (c, seen_clone) = (counter.clone(), seen.clone());
    let _reaction = autorun(move || {
        seen_clone.set(c.get("").as_f64().unwrap_or_default());
    });

    counter.set("", 2);
    settle().await;
    assert_eq!(seen.get(), 2.0);
    assert!(is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn multi_thread_runtime_falls_back_to_manual_drains() {
    install_tokio_driver();

    let counter = Entity::with_value(1);
    let seen = Rc::new(Cell::new(0.0));
    let (c, seen_clone) = (counter.clone(), seen.clone());
    let _reaction = autorun(move || {
        seen_clone.set(c.get("").as_f64().unwrap_or_default());
    });

    counter.set("", 2);
    settle().await;
    assert_eq!(seen.get(), 1.0);
    assert!(!is_idle());

    drain();
    assert_eq!(seen.get(), 2.0);
}
