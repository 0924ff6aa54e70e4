use std::cell::{Cell};
use std::time::{Duration, Instant};

use ash::vk;

use vkbatch::sync::*;
use vkbatch::{Error, ErrorClass};

// Queue whose fences signal only if told to
#[derive(Default)]
struct StubQueue {
    signals     : bool,
    fail_submit : bool,
    lose_device : bool,
    created     : Cell<u32>,
    destroyed   : Cell<u32>,
}

impl SubmitQueue for StubQueue {
    type Fence = u32;

    fn create_fence(&self) -> vkbatch::Result<u32> {
        self.created.set(self.created.get() + 1);
        Ok(self.created.get())
    }

    fn submit(&self, _command_buffer : vk::CommandBuffer, _fence : &u32) -> vkbatch::Result<()> {
        if self.fail_submit {
            Err(Error::Submission(vk::Result::ERROR_DEVICE_LOST))
        } else {
            Ok(())
        }
    }

    fn wait(&self, _fence : &u32, timeout : Duration) -> vkbatch::Result<FenceStatus> {
        if self.lose_device {
            Err(Error::FenceWait(vk::Result::ERROR_DEVICE_LOST))
        } else if self.signals {
            Ok(FenceStatus::Signaled)
        } else {
            std::thread::sleep(timeout);
            Ok(FenceStatus::TimedOut)
        }
    }

    fn destroy_fence(&self, _fence : u32) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

#[test]
fn unsignaled_fence_times_out() {
    let queue = StubQueue::default();
    let timeout = Duration::from_millis(20);

    let start = Instant::now();
    let result = submit_and_wait(&queue, vk::CommandBuffer::null(), timeout);
    let elapsed = start.elapsed();

    let Err(e) = result else {
        panic!("Expected a timeout");
    };

    assert!(matches!(e, Error::DispatchTimeout(t) if t == timeout));
    assert_eq!(e.class(), ErrorClass::Execution);
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_secs(5));

    // In-flight fences must not be destroyed
    assert_eq!(queue.destroyed.get(), 0);
}

#[test]
fn signaled_fence_completes_and_is_released() {
    let queue = StubQueue { signals : true, ..Default::default() };

    submit_and_wait(&queue, vk::CommandBuffer::null(), Duration::from_secs(1)).unwrap();

    assert_eq!(queue.created.get(), 1);
    assert_eq!(queue.destroyed.get(), 1);
}

#[test]
fn failed_submission_releases_fence() {
    let queue = StubQueue { fail_submit : true, ..Default::default() };

    let result = submit_and_wait(&queue, vk::CommandBuffer::null(), Duration::from_secs(1));

    assert!(matches!(result, Err(Error::Submission(vk::Result::ERROR_DEVICE_LOST))));
    assert_eq!(queue.destroyed.get(), 1);
}

#[test]
fn lost_device_during_wait_releases_fence() {
    let queue = StubQueue { lose_device : true, ..Default::default() };

    let result = submit_and_wait(&queue, vk::CommandBuffer::null(), Duration::from_secs(1));

    assert!(matches!(result, Err(Error::FenceWait(vk::Result::ERROR_DEVICE_LOST))));
    assert_eq!(queue.created.get(), 1);
    assert_eq!(queue.destroyed.get(), queue.created.get());
}
