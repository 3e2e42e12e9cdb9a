//! Integration Tests for the Reactive Core
//!
//! These tests verify that entities, reactions, the scheduler and the
//! sleep controller work together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::json;

use arbor_core::{
    autorun, autorun_with, drain, freeze, has_view_listener, is_idle, root, unfreeze, untracked,
    AutorunOptions, BoundOptions, Collection, Entity, Reaction, Scheduler, Value,
};

/// A reaction that counts its runs and reads `path` from `entity`.
fn watch(entity: &Entity, path: &'static str) -> (Reaction, Rc<Cell<usize>>) {
    let runs = Rc::new(Cell::new(0));
    let runs_clone = runs.clone();
    let e = entity.clone();
    let reaction = autorun(move || {
        e.get(path);
        runs_clone.set(runs_clone.get() + 1);
    });
    (reaction, runs)
}

/// A view-owned reaction reading `path` from `entity`.
fn view(entity: &Entity, path: &'static str) -> (Reaction, Rc<RefCell<Value>>) {
    let seen = Rc::new(RefCell::new(Value::Null));
    let seen_clone = seen.clone();
    let e = entity.clone();
    let reaction = autorun_with(AutorunOptions::new().view().named("view"), move || {
        *seen_clone.borrow_mut() = e.get(path);
    });
    (reaction, seen)
}

// ----------------------------------------------------------------------------
// Dependency precision
// ----------------------------------------------------------------------------

#[test]
fn reaction_ignores_sibling_changes() {
    let entity = Entity::with_value(json!({"a": {"b": 1, "c": 1}}));
    let (_reaction, runs) = watch(&entity, "a.b");

    entity.set("a.c", 2);
    drain();
    assert_eq!(runs.get(), 1);

    entity.set("a.b", 2);
    drain();
    assert_eq!(runs.get(), 2);
}

#[test]
fn reaction_follows_wholesale_replacement() {
    let entity = Entity::with_value(json!({"a": {"b": 1}}));
    let (_reaction, runs) = watch(&entity, "a.b");

    entity.set("a", json!({"b": 2}));
    drain();
    assert_eq!(runs.get(), 2);

    entity.set("", json!({"a": {"b": 3}}));
    drain();
    assert_eq!(runs.get(), 3);

    entity.set("", json!({"a": "flat"}));
    drain();
    assert_eq!(runs.get(), 4);
}

#[test]
fn deep_equal_replacement_does_not_notify() {
    let entity = Entity::with_value(json!({"a": {"b": [1, 2], "c": {"d": true}}}));
    let (_leaf, leaf_runs) = watch(&entity, "a.b");
    let (_whole, whole_runs) = watch(&entity, "");

    entity.set("a", json!({"b": [1, 2], "c": {"d": true}}));
    drain();
    assert_eq!(leaf_runs.get(), 1);
    assert_eq!(whole_runs.get(), 1);

    entity.set("a", json!({"b": [1, 2, 3], "c": {"d": true}}));
    drain();
    assert_eq!(leaf_runs.get(), 2);
    assert_eq!(whole_runs.get(), 2);
}

#[test]
fn whole_value_listener_sees_unsubscribed_changes() {
    let entity = Entity::with_value(json!({"a": {"b": 1}, "z": 1}));
    let (_whole, runs) = watch(&entity, "");

    entity.unset("z");
    drain();
    assert_eq!(runs.get(), 2);

    entity.set("a.new", 1);
    drain();
    assert_eq!(runs.get(), 3);
}

#[test]
fn writes_into_missing_paths_notify_prior_readers() {
    let entity = Entity::new();
    let (_reaction, runs) = watch(&entity, "user.profile.name");

    entity.set("user.profile.name", "ann");
    drain();
    assert_eq!(runs.get(), 2);
    assert_eq!(entity.get("user.profile.name"), "ann");
}

// ----------------------------------------------------------------------------
// Examples
// ----------------------------------------------------------------------------

#[test]
fn captured_value_updates_after_drain() {
    let entity = Entity::new();
    entity.set("count", 4);

    let captured = Rc::new(Cell::new(0.0));
    let captured_clone = captured.clone();
    let e = entity.clone();
    let _reaction = autorun(move || {
        captured_clone.set(e.get("count").as_f64().unwrap_or_default());
    });

    entity.set("count", 5);
    assert_eq!(captured.get(), 4.0);

    drain();
    assert_eq!(captured.get(), 5.0);
}

#[test]
fn pushes_land_in_order() {
    let entity = Entity::new();
    entity.set("list", Value::seq(Vec::<Value>::new()));

    entity.push("list", 42);
    entity.push("list", 7);
    drain();

    assert_eq!(entity.get("list.1"), 7);
    assert_eq!(entity.get("list.length"), 2);
}

#[test]
fn sequence_watchers_see_only_their_slots() {
    let entity = Entity::with_value(json!({"list": [1]}));
    let (_len, len_runs) = watch(&entity, "list.length");
    let (_first, first_runs) = watch(&entity, "list.0");
    let (_last, last_runs) = watch(&entity, "list.1");

    entity.push("list", 2);
    drain();
    assert_eq!(len_runs.get(), 2);
    assert_eq!(first_runs.get(), 1);
    assert_eq!(last_runs.get(), 2);

    entity.unshift("list", 0);
    drain();
    assert_eq!(len_runs.get(), 3);
    assert_eq!(first_runs.get(), 2);

    entity.remove_first("list");
    entity.remove_last("list");
    drain();
    assert_eq!(entity.get("list").to_json(), json!([1]));
    assert_eq!(len_runs.get(), 4);
}

#[test]
fn index_writes_notify_length_watchers() {
    let entity = Entity::with_value(json!({"list": [1]}));
    let (_len, len_runs) = watch(&entity, "list.length");
    let (_first, first_runs) = watch(&entity, "list.0");

    entity.set("list.3", "x");
    drain();
    assert_eq!(entity.get("list.length"), 4);
    assert_eq!(len_runs.get(), 2);
    assert_eq!(first_runs.get(), 1);

    entity.set("list.1", "y");
    drain();
    assert_eq!(len_runs.get(), 2);
}

#[test]
fn same_instant_does_not_notify() {
    let t: DateTime<Utc> = "2013-11-07T19:18:05.098Z".parse().unwrap();
    let entity = Entity::new();
    entity.set("when", t);
    let (_reaction, runs) = watch(&entity, "when");

    entity.set("when", t);
    drain();
    assert_eq!(runs.get(), 1);

    entity.set("when", t + chrono::Duration::seconds(1));
    drain();
    assert_eq!(runs.get(), 2);
}

#[test]
fn read_silent_and_untracked_do_not_subscribe() {
    let entity = Entity::with_value(json!({"x": 1, "y": 1}));
    let e = entity.clone();
    let runs = Rc::new(Cell::new(0));
    let runs_clone = runs.clone();
    let _reaction = autorun(move || {
        e.read_silent("x");
        untracked(|| e.get("y"));
        runs_clone.set(runs_clone.get() + 1);
    });

    entity.set("x", 2);
    entity.set("y", 2);
    drain();
    assert_eq!(runs.get(), 1);
    assert_eq!(entity.listener_count(), 0);
}

#[test]
fn root_entity_serves_as_a_global_store() {
    root().set("session.user", "ann");
    let (_reaction, runs) = watch(&root(), "session.user");

    root().set("session.user", "bob");
    drain();
    assert_eq!(runs.get(), 2);
}

// ----------------------------------------------------------------------------
// Scheduling
// ----------------------------------------------------------------------------

#[test]
fn higher_priority_completes_first() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let entity = Entity::with_value(json!({"go": false}));

    let mut reactions = Vec::new();
    for priority in [5, 10] {
        let log = log.clone();
        let e = entity.clone();
        reactions.push(autorun_with(
            AutorunOptions::new().priority(priority),
            move || {
                if e.get("go").is_truthy() {
                    log.borrow_mut().push(format!("start {priority}"));
                    log.borrow_mut().push(format!("end {priority}"));
                }
            },
        ));
    }

    entity.set("go", true);
    drain();
    assert_eq!(
        *log.borrow(),
        vec!["start 10", "end 10", "start 5", "end 5"]
    );
}

#[test]
fn frozen_scheduler_holds_work_until_unfrozen() {
    freeze();
    let entity = Entity::with_value(json!({"n": 1}));
    let (reaction, runs) = watch(&entity, "n");

    entity.set("n", 2);
    entity.set("n", 3);
    assert!(Scheduler::is_queued(&reaction));
    assert_eq!(Scheduler::pending(), 1);
    assert_eq!(runs.get(), 1);

    drain();
    assert_eq!(runs.get(), 1);
    assert!(Scheduler::is_queued(&reaction));

    unfreeze();
    assert!(!is_idle());
    drain();
    assert_eq!(runs.get(), 2);
    assert_eq!(entity.get("n"), 3);
    assert!(is_idle());
}

#[test]
fn child_reactions_are_rebuilt_with_their_parent() {
    let entity = Entity::with_value(json!({"outer": 1, "inner": 1}));
    let inner_runs = Rc::new(Cell::new(0));

    let e = entity.clone();
    let inner_clone = inner_runs.clone();
    let parent = autorun(move || {
        e.get("outer");
        let e = e.clone();
        let inner_runs = inner_clone.clone();
        let _child = autorun(move || {
            e.get("inner");
            inner_runs.set(inner_runs.get() + 1);
        });
    });
    assert_eq!(inner_runs.get(), 1);

    entity.set("inner", 2);
    drain();
    assert_eq!(inner_runs.get(), 2);

    entity.set("outer", 2);
    drain();
    assert_eq!(inner_runs.get(), 3);
    assert_eq!(parent.children_count(), 1);
    assert_eq!(entity.listener_count(), 2);
}

#[test]
fn immediate_reactions_skip_the_queue() {
    let entity = Entity::with_value(json!({"n": 1}));
    let seen = Rc::new(Cell::new(0.0));
    let seen_clone = seen.clone();
    let e = entity.clone();
    let _reaction = autorun_with(AutorunOptions::new().immediate(), move || {
        seen_clone.set(e.get("n").as_f64().unwrap_or_default());
    });

    entity.set("n", 9);
    assert_eq!(seen.get(), 9.0);
    assert_eq!(Scheduler::pending(), 0);
}

#[test]
fn faulty_reaction_does_not_block_others() {
    let entity = Entity::with_value(json!({"n": 1}));
    let (_healthy, runs) = watch(&entity, "n");

    let e = entity.clone();
    let _faulty = autorun_with(
        AutorunOptions::new().priority(9000).named("faulty"),
        move || {
            if e.get("n").as_f64() == Some(2.0) {
                panic!("bad input");
            }
        },
    );

    entity.set("n", 2);
    let result = catch_unwind(AssertUnwindSafe(drain));
    assert!(result.is_err());
    assert_eq!(runs.get(), 1);
    assert!(!is_idle());

    drain();
    assert_eq!(runs.get(), 2);
}

// ----------------------------------------------------------------------------
// Destroy
// ----------------------------------------------------------------------------

#[test]
fn destroyed_reaction_has_no_effect() {
    let entity = Entity::with_value(json!({"n": 1}));
    let (reaction, runs) = watch(&entity, "n");

    entity.set("n", 2);
    reaction.destroy();
    drain();
    reaction.trigger();
    drain();

    assert_eq!(runs.get(), 1);
    assert!(!entity.has_listener("n", reaction.id()));
    assert_eq!(entity.listener_count(), 0);
}

#[test]
fn destroyed_entity_notifies_and_stops() {
    let source = Entity::with_value(json!({"n": 1}));
    let s = source.clone();
    let calls = Rc::new(Cell::new(0));
    let calls_clone = calls.clone();
    let model = Entity::bound(move || {
        calls_clone.set(calls_clone.get() + 1);
        s.get("n")
    });
    let (_view, seen) = view(&model, "");
    assert_eq!(*seen.borrow(), 1);

    model.destroy();
    drain();
    assert!(seen.borrow().is_null());

    source.set("n", 2);
    drain();
    assert_eq!(calls.get(), 1);
    assert_eq!(source.listener_count(), 0);
}

// ----------------------------------------------------------------------------
// Bound entities, sleep and wake
// ----------------------------------------------------------------------------

#[test]
fn unobserved_sleeping_entity_never_computes() {
    let source = Entity::with_value(json!({"n": 1}));
    let calls = Rc::new(Cell::new(0));
    let calls_clone = calls.clone();
    let s = source.clone();
    let lazy = Entity::bound_with(BoundOptions::new().sleep(), move || {
        calls_clone.set(calls_clone.get() + 1);
        s.get("n")
    });

    for n in 2..5 {
        source.set("n", n);
        drain();
    }
    let (_plain, _) = watch(&lazy, "");
    drain();

    assert_eq!(calls.get(), 0);
    assert!(lazy.is_sleeping());
    assert!(!has_view_listener(&lazy));
}

#[test]
fn observing_the_tail_wakes_the_whole_chain() {
    let source = Entity::with_value(json!({"x": 1}));

    let s = source.clone();
    let c = Entity::bound_with(BoundOptions::new().sleep().named("c"), move || {
        s.get("x").as_f64().unwrap_or_default() + 1.0
    });
    let c_ref = c.clone();
    let b = Entity::bound_with(BoundOptions::new().sleep().named("b"), move || {
        c_ref.get("").as_f64().unwrap_or_default() * 10.0
    });
    let b_ref = b.clone();
    let a = Entity::bound_with(BoundOptions::new().sleep().named("a"), move || {
        b_ref.get("").as_f64().unwrap_or_default() + 0.5
    });
    assert!(a.is_sleeping() && b.is_sleeping() && c.is_sleeping());

    let (_view, seen) = view(&a, "");
    drain();

    assert!(!a.is_sleeping());
    assert!(!b.is_sleeping());
    assert!(!c.is_sleeping());
    assert_eq!(*seen.borrow(), 20.5);

    source.set("x", 2);
    drain();
    assert_eq!(*seen.borrow(), 30.5);
}

#[test]
fn cyclic_sleeping_entities_terminate() {
    let hub = Entity::new();

    let h = hub.clone();
    let a = Entity::bound_with(BoundOptions::new().sleep().named("a"), move || {
        json!({"tag": "a", "peer": h.get("b.tag").to_json()})
    });
    let h = hub.clone();
    let b = Entity::bound_with(BoundOptions::new().sleep().named("b"), move || {
        json!({"tag": "b", "peer": h.get("a.tag").to_json()})
    });
    hub.set("a", &a);
    hub.set("b", &b);

    assert!(!has_view_listener(&a));

    let (_view, seen) = view(&hub, "a.peer");
    drain();

    assert_eq!(*seen.borrow(), "b");
    assert_eq!(b.get("peer"), "a");
    assert!(has_view_listener(&b));
    assert!(is_idle());
}

#[test]
fn bound_entity_created_inside_a_reaction_outlives_reruns() {
    let source = Entity::with_value(json!({"n": 1}));
    let trigger = Entity::with_value(json!({"round": 0}));
    let made = Rc::new(RefCell::new(Vec::<Entity>::new()));

    let (s, t, made_clone) = (source.clone(), trigger.clone(), made.clone());
    let _parent = autorun(move || {
        t.get("round");
        let s = s.clone();
        made_clone
            .borrow_mut()
            .push(Entity::bound(move || s.get("n")));
    });

    trigger.set("round", 1);
    drain();

    let made = made.borrow();
    assert_eq!(made.len(), 2);

    source.set("n", 5);
    drain();
    assert_eq!(made[0].get(""), 5);
    assert_eq!(made[1].get(""), 5);
    assert!(made.iter().all(|e| !e.reaction().unwrap().is_destroyed()));
}

#[test]
fn nested_entity_swap_rebinds_readers() {
    let first = Entity::with_value(json!({"name": "ann"}));
    let second = Entity::with_value(json!({"name": "bob"}));
    let store = Entity::new();
    store.set("current", &first);

    let (_view, seen) = view(&store, "current.name");
    assert_eq!(*seen.borrow(), "ann");

    store.set("current", &second);
    drain();
    assert_eq!(*seen.borrow(), "bob");

    first.set("name", "cy");
    drain();
    assert_eq!(*seen.borrow(), "bob");
    assert_eq!(first.listener_count(), 0);

    second.set("name", "dee");
    drain();
    assert_eq!(*seen.borrow(), "dee");
}

#[test]
fn whole_value_readers_see_nested_entity_changes() {
    let child = Entity::with_value(json!({"name": "ann"}));
    let parent = Entity::new();
    parent.set("child", &child);
    parent.push("others", &child);

    let seen = Rc::new(RefCell::new(serde_json::Value::Null));
    let (p, seen_clone) = (parent.clone(), seen.clone());
    let _whole = autorun(move || {
        *seen_clone.borrow_mut() = p.get("").to_json();
    });
    let (_list, list_runs) = watch(&parent, "others");

    child.set("name", "bob");
    drain();
    assert_eq!(
        *seen.borrow(),
        json!({"child": {"name": "bob"}, "others": [{"name": "bob"}]})
    );
    assert_eq!(list_runs.get(), 2);
}

#[test]
fn collection_views_follow_members() {
    let todos = Collection::new();
    let first = todos.add(json!({"id": "t1", "done": false}));

    let rendered = Rc::new(RefCell::new(json!(null)));
    let (t, r) = (todos.clone(), rendered.clone());
    let _view = autorun_with(AutorunOptions::new().view(), move || {
        *r.borrow_mut() = t.entity().get("").to_json();
    });

    first.set("done", true);
    drain();
    assert_eq!(rendered.borrow()["#t1"]["done"], json!(true));

    first.set("id", "t9");
    drain();
    assert!(rendered.borrow().get("#t1").is_none());
    assert_eq!(rendered.borrow()["#t9"]["id"], json!("t9"));
    assert_eq!(rendered.borrow()["size"], json!(1));
}

// ----------------------------------------------------------------------------
// Cycle safety
// ----------------------------------------------------------------------------

#[test]
fn self_referencing_entity_terminates() {
    let entity = Entity::new();
    entity.set("me", &entity);
    entity.set("list", Value::seq([Value::from(&entity)]));
    let (_whole, runs) = watch(&entity, "");
    let (_deep, deep_runs) = watch(&entity, "me.me.me.list.length");

    entity.set("list", Value::seq([Value::from(&entity)]));
    entity.set("other", 1);
    drain();

    assert!(runs.get() >= 2);
    assert!(deep_runs.get() >= 1);
    assert_eq!(entity.get("me.me.list.length"), 1);

    entity.destroy();
}

#[test]
fn very_deep_values_assume_change() {
    let mut deep = json!("leaf");
    for _ in 0..64 {
        deep = json!({ "next": deep });
    }
    let entity = Entity::with_value(json!({ "root": deep.clone() }));
    let (_whole, runs) = watch(&entity, "root");

    entity.set("root", deep);
    drain();
    assert_eq!(runs.get(), 2);
}
