//! Frame protocol tests against a simulated backend.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use quad_renderer::{
    AcquireOutcome, FrameBackend, FrameOutcome, FrameScheduler, PresentOutcome, TEARDOWN_ORDER,
    TeardownStep,
};
use quad_rhi::{RhiError, RhiResult, vk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    WaitSlot(usize),
    Acquire(usize),
    ResetFence(usize),
    Submit(usize, u32),
    Present(usize, u32),
    WaitIdle,
    Destroy(TeardownStep),
    Create(u32, u32),
    DeviceDestroyed,
}

type EventLog = Rc<RefCell<Vec<Event>>>;

struct FakeBackend {
    events: EventLog,
    image_count: u32,
    next_image: u32,
    rebuilt_image_count: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    acquire_error: Option<vk::Result>,
    extent: vk::Extent2D,
}

impl FakeBackend {
    fn new(image_count: u32) -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
            image_count,
            next_image: 0,
            rebuilt_image_count: image_count,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            acquire_error: None,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
        }
    }

    fn log(&self) -> EventLog {
        Rc::clone(&self.events)
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl FrameBackend for FakeBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.record(Event::WaitSlot(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        self.record(Event::Acquire(slot));
        if let Some(result) = self.acquire_error {
            return Err(RhiError::VulkanError(result));
        }
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.record(Event::ResetFence(slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.record(Event::Submit(slot, image_index));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.record(Event::Present(slot, image_index));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Optimal))
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.record(Event::WaitIdle);
        Ok(())
    }

    fn destroy_swapchain_state(&mut self) {
        for step in TEARDOWN_ORDER {
            self.record(Event::Destroy(step));
        }
    }

    fn create_swapchain_state(&mut self, extent: vk::Extent2D) -> RhiResult<usize> {
        self.record(Event::Create(extent.width, extent.height));
        self.image_count = self.rebuilt_image_count;
        self.next_image = 0;
        Ok(self.image_count as usize)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.record(Event::DeviceDestroyed);
    }
}

fn teardown_events() -> Vec<Event> {
    TEARDOWN_ORDER.iter().map(|&step| Event::Destroy(step)).collect()
}

fn rebuild_events(width: u32, height: u32) -> Vec<Event> {
    let mut events = vec![Event::WaitIdle];
    events.extend(teardown_events());
    events.push(Event::Create(width, height));
    events
}

fn index_of(events: &[Event], event: Event) -> usize {
    events
        .iter()
        .position(|&e| e == event)
        .unwrap_or_else(|| panic!("{:?} not found in {:?}", event, events))
}

#[test]
fn test_slot_fence_waited_before_reuse() {
    let mut backend = FakeBackend::new(2);
    let mut scheduler = FrameScheduler::new(2);

    for i in 0..6 {
        let slot = i % 2;
        let image = (i % 2) as u32;
        assert_eq!(scheduler.current_slot(), slot);

        let outcome = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);

        assert_eq!(
            backend.take_events(),
            vec![
                Event::WaitSlot(slot),
                Event::Acquire(slot),
                Event::ResetFence(slot),
                Event::Submit(slot, image),
                Event::Present(slot, image),
            ]
        );
    }
    assert_eq!(scheduler.current_slot(), 0);
}

#[test]
fn test_out_of_date_acquire_rebuilds_without_submit() {
    let mut backend = FakeBackend::new(3);
    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
    let mut scheduler = FrameScheduler::new(3);

    let outcome = scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);

    let mut expected = vec![Event::WaitSlot(0), Event::Acquire(0)];
    expected.extend(rebuild_events(800, 600));
    let events = backend.take_events();
    assert_eq!(events, expected);
    assert!(!events.iter().any(|e| matches!(e, Event::Submit(..))));
    assert!(!events.iter().any(|e| matches!(e, Event::Present(..))));

    // The abandoned iteration does not consume the slot.
    assert_eq!(scheduler.current_slot(), 0);
    assert!(!scheduler.is_rebuild_pending());
}

#[test]
fn test_out_of_date_present_replaces_frame_slots() {
    let mut backend = FakeBackend::new(2);
    backend.present_script.push_back(PresentOutcome::OutOfDate);
    let mut scheduler = FrameScheduler::new(2);

    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Rebuilt
    );
    let events = backend.take_events();

    // The semaphores signaled for the stale present die with the old state,
    // only after the device is idle, and before anything new is built.
    let present = index_of(&events, Event::Present(0, 0));
    let idle = index_of(&events, Event::WaitIdle);
    let slots = index_of(&events, Event::Destroy(TeardownStep::FrameSlots));
    let create = index_of(&events, Event::Create(800, 600));
    assert!(present < idle);
    assert!(idle < slots);
    assert!(slots < create);

    // The next frame starts from the other slot on fresh sync objects.
    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Presented
    );
    assert_eq!(backend.take_events()[0], Event::WaitSlot(1));
}

#[test]
fn test_suboptimal_present_rebuilds_after_presenting() {
    let mut backend = FakeBackend::new(2);
    backend.present_script.push_back(PresentOutcome::Suboptimal);
    backend.rebuilt_image_count = 4;
    let mut scheduler = FrameScheduler::new(2);

    let outcome = scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);

    let mut expected = vec![
        Event::WaitSlot(0),
        Event::Acquire(0),
        Event::ResetFence(0),
        Event::Submit(0, 0),
        Event::Present(0, 0),
    ];
    expected.extend(rebuild_events(800, 600));
    assert_eq!(backend.take_events(), expected);

    assert_eq!(scheduler.images_in_flight(), &[None, None, None, None]);
    assert_eq!(scheduler.current_slot(), 1);
}

#[test]
fn test_out_of_date_present_rebuilds() {
    let mut backend = FakeBackend::new(2);
    backend.present_script.push_back(PresentOutcome::OutOfDate);
    let mut scheduler = FrameScheduler::new(2);

    let outcome = scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);
    let events = backend.take_events();
    assert!(index_of(&events, Event::Present(0, 0)) < index_of(&events, Event::WaitIdle));
}

#[test]
fn test_resize_flag_rebuilds_after_presenting() {
    let mut backend = FakeBackend::new(3);
    backend.rebuilt_image_count = 2;
    let mut scheduler = FrameScheduler::new(3);

    scheduler.draw_frame(&mut backend).unwrap();
    backend.take_events();

    backend.extent = vk::Extent2D {
        width: 1024,
        height: 768,
    };
    scheduler.notify_resized(1024, 768);

    let outcome = scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);

    let events = backend.take_events();
    assert!(index_of(&events, Event::Present(1, 1)) < index_of(&events, Event::WaitIdle));
    assert_eq!(events.last(), Some(&Event::Create(1024, 768)));
    assert_eq!(scheduler.images_in_flight(), &[None, None]);

    // The flag is consumed by the rebuild.
    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Presented
    );
}

#[test]
fn test_suboptimal_acquire_rebuilds_after_presenting() {
    let mut backend = FakeBackend::new(2);
    backend.acquire_script.push_back(AcquireOutcome::Acquired {
        image_index: 1,
        suboptimal: true,
    });
    let mut scheduler = FrameScheduler::new(2);

    let outcome = scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Rebuilt);

    let events = backend.take_events();
    assert!(index_of(&events, Event::Present(0, 1)) < index_of(&events, Event::WaitIdle));
}

#[test]
fn test_image_owner_fence_waited_when_slots_exceed_images() {
    let mut backend = FakeBackend::new(1);
    let mut scheduler = FrameScheduler::new(1);

    scheduler.draw_frame(&mut backend).unwrap();
    assert_eq!(scheduler.images_in_flight(), &[Some(0)]);
    backend.take_events();

    scheduler.draw_frame(&mut backend).unwrap();
    let events = backend.take_events();
    assert_eq!(
        events,
        vec![
            Event::WaitSlot(1),
            Event::Acquire(1),
            Event::WaitSlot(0),
            Event::ResetFence(1),
            Event::Submit(1, 0),
            Event::Present(1, 0),
        ]
    );
    assert_eq!(scheduler.images_in_flight(), &[Some(1)]);
}

#[test]
fn test_no_owner_wait_for_own_slot() {
    let mut backend = FakeBackend::new(2);
    let mut scheduler = FrameScheduler::new(2);

    for _ in 0..4 {
        scheduler.draw_frame(&mut backend).unwrap();
    }
    let waits = backend
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, Event::WaitSlot(_)))
        .count();
    assert_eq!(waits, 4);
}

#[test]
fn test_shutdown_waits_idle_then_destroys_in_order() {
    let mut backend = FakeBackend::new(2);
    let log = backend.log();
    let mut scheduler = FrameScheduler::new(2);

    scheduler.draw_frame(&mut backend).unwrap();
    backend.take_events();

    scheduler.shutdown(&mut backend).unwrap();
    drop(backend);

    let events = log.borrow().clone();
    let mut expected = vec![Event::WaitIdle];
    expected.extend(teardown_events());
    expected.push(Event::DeviceDestroyed);
    assert_eq!(events, expected);

    let order = [
        Event::Destroy(TeardownStep::Framebuffers),
        Event::Destroy(TeardownStep::Pipeline),
        Event::Destroy(TeardownStep::RenderPass),
        Event::Destroy(TeardownStep::ImageViews),
        Event::Destroy(TeardownStep::Swapchain),
        Event::Destroy(TeardownStep::FrameSlots),
        Event::DeviceDestroyed,
    ];
    for pair in order.windows(2) {
        assert!(index_of(&events, pair[0]) < index_of(&events, pair[1]));
    }
}

#[test]
fn test_zero_extent_pauses_rebuild_until_restored() {
    let mut backend = FakeBackend::new(2);
    let mut scheduler = FrameScheduler::new(2);

    backend.extent = vk::Extent2D {
        width: 0,
        height: 0,
    };
    scheduler.notify_resized(0, 0);

    // The frame in progress is still presented, then the rebuild waits.
    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Paused
    );
    assert!(scheduler.is_rebuild_pending());
    let events = backend.take_events();
    assert!(events.contains(&Event::Present(0, 0)));
    assert!(!events.contains(&Event::WaitIdle));

    for _ in 0..3 {
        assert_eq!(
            scheduler.draw_frame(&mut backend).unwrap(),
            FrameOutcome::Paused
        );
    }
    assert!(backend.take_events().is_empty());

    backend.extent = vk::Extent2D {
        width: 640,
        height: 480,
    };
    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Rebuilt
    );
    assert_eq!(backend.take_events(), rebuild_events(640, 480));
    assert!(!scheduler.is_rebuild_pending());

    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Presented
    );
}

#[test]
fn test_out_of_date_while_minimized_pauses() {
    let mut backend = FakeBackend::new(2);
    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
    backend.extent = vk::Extent2D {
        width: 1920,
        height: 0,
    };
    let mut scheduler = FrameScheduler::new(2);

    assert_eq!(
        scheduler.draw_frame(&mut backend).unwrap(),
        FrameOutcome::Paused
    );
    assert_eq!(
        backend.take_events(),
        vec![Event::WaitSlot(0), Event::Acquire(0)]
    );
}

#[test]
fn test_acquire_failure_is_fatal() {
    let mut backend = FakeBackend::new(2);
    backend.acquire_error = Some(vk::Result::ERROR_DEVICE_LOST);
    let mut scheduler = FrameScheduler::new(2);

    let err = scheduler.draw_frame(&mut backend).unwrap_err();
    assert!(matches!(
        err,
        RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
    ));
    let events = backend.take_events();
    assert!(!events.contains(&Event::WaitIdle));
    assert!(!events.iter().any(|e| matches!(e, Event::Submit(..))));
}
