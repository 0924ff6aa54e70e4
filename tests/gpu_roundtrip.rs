mod common;

use std::fs;

use vkbatch::*;
use vkbatch::session::{DispatchState};
use vkbatch::vulkan::{validation_error_count};

// Record i holds the sequence starting at base + 100 * i
fn inputs_from(count : usize, base : i32) -> Vec<DoubleFe25519> {
    (0..count).map(|i| {
        DoubleFe25519::new(Fe25519::sequence(base + 100 * i as i32), Fe25519::sequence(-1))
    }).collect()
}

fn inputs(count : usize) -> Vec<DoubleFe25519> {
    inputs_from(count, 0)
}

fn run(work_items : u32, tag : &str, validation : bool) -> Vec<Fe25519> {
    let kernel = common::copy_kernel_file(tag);

    let config = DispatchConfig::new()
        .kernel_path(&kernel)
        .total_work_items(work_items)
        .workgroup_size(16)
        .validation(validation);

    let count = work_items as usize;
    let mut session = ComputeSession::new(&config, BatchLayout::fe25519(count)).unwrap();
    let outputs = session.run_batch(&inputs(count)).unwrap();

    drop(session);
    let _ = fs::remove_file(kernel);
    outputs
}

#[test]
#[ignore = "requires GPU"]
fn copies_full_batch() {
    let outputs = run(16, "full", false);

    assert_eq!(outputs.len(), 16);

    for (i, output) in outputs.iter().enumerate() {
        assert_eq!(*output, Fe25519::sequence(100 * i as i32));
    }
}

#[test]
#[ignore = "requires GPU"]
fn partial_workgroup_covers_every_item() {
    let outputs = run(17, "partial", false);

    assert_eq!(outputs.len(), 17);
    assert_eq!(outputs[16], Fe25519::sequence(1600));
}

#[test]
#[ignore = "requires GPU and validation layer"]
fn sessions_can_be_created_twice() {
    let errors = validation_error_count();

    let first = run(16, "first", true);
    let second = run(16, "second", true);

    assert_eq!(first, second);

    // Leaked handles are reported when the device is destroyed
    assert_eq!(validation_error_count(), errors);
}

#[test]
#[ignore = "requires GPU"]
fn repeated_dispatch_reuses_session() {
    let kernel = common::copy_kernel_file("repeat");

    let config = DispatchConfig::new()
        .kernel_path(&kernel)
        .validation(false);

    let mut session = ComputeSession::new(&config, BatchLayout::fe25519(16)).unwrap();

    let a : Vec<Fe25519> = session.run_batch(&inputs(16)).unwrap();
    assert_eq!(session.state(), DispatchState::Completed);

    let b : Vec<Fe25519> = session.run_batch(&inputs_from(16, 5000)).unwrap();

    assert_ne!(a, b);
    assert_eq!(a[3], Fe25519::sequence(300));

    for (i, output) in b.iter().enumerate() {
        assert_eq!(*output, Fe25519::sequence(5000 + 100 * i as i32));
    }

    assert_eq!(session.geometry(), (1, 1, 1));

    drop(session);
    let _ = fs::remove_file(kernel);
}

#[test]
fn wrong_record_count_is_rejected_before_device_setup() {
    let config = DispatchConfig::new().total_work_items(16);
    let result = ComputeSession::new(&config, BatchLayout::fe25519(8));

    assert!(matches!(result, Err(Error::Config(_))));
}
