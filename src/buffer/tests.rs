// src/buffer/tests.rs

use std::sync::Arc;

use super::mock::{MockAllocator, MockProvider};
use super::*;
use crate::kms::mock::{MockCard, MockCardState};
use test_log::test;

fn request(modifier: DrmModifier) -> SurfaceRequest {
    SurfaceRequest {
        width: 1280,
        height: 720,
        format: PixelFormat::Xrgb8888,
        modifier,
    }
}

// --- framebuffer_for ---

#[test]
fn framebuffer_for_is_idempotent() {
    let card = Arc::new(MockCard::new(MockCardState::default()));
    let mut provider = MockProvider::new(2);
    let mut buffer = provider.lock_front_buffer().unwrap();

    let first = framebuffer_for(&mut buffer, &card).unwrap();
    let second = framebuffer_for(&mut buffer, &card).unwrap();

    assert_eq!(first, second);
    assert_eq!(card.state().added.len(), 1);
}

#[test]
fn registration_survives_release_and_relock() {
    let card = Arc::new(MockCard::new(MockCardState::default()));
    let mut provider = MockProvider::new(1);

    let mut buffer = provider.lock_front_buffer().unwrap();
    let id = framebuffer_for(&mut buffer, &card).unwrap();
    drop(buffer);

    let mut again = provider.lock_front_buffer().unwrap();
    assert_eq!(again.framebuffer(), Some(id));
    assert_eq!(framebuffer_for(&mut again, &card).unwrap(), id);
    assert_eq!(card.state().added.len(), 1);
    assert!(card.state().removed.is_empty());
}

#[test]
fn destroying_a_buffer_revokes_its_registration_once() {
    let card = Arc::new(MockCard::new(MockCardState::default()));
    let mut provider = MockProvider::new(2);

    let mut a = provider.lock_front_buffer().unwrap();
    let mut b = provider.lock_front_buffer().unwrap();
    let id_a = framebuffer_for(&mut a, &card).unwrap();
    let id_b = framebuffer_for(&mut b, &card).unwrap();
    assert_ne!(id_a, id_b);
    drop(a);
    drop(b);

    provider.destroy_slot(0);
    assert_eq!(card.state().removed, vec![id_a]);

    drop(provider);
    assert_eq!(card.state().removed, vec![id_a, id_b]);
    assert!(card.state().live_framebuffers().is_empty());
}

#[test]
fn registration_failure_leaves_buffer_unregistered() {
    let card = Arc::new(MockCard::new(MockCardState {
        reject_all_fb: true,
        ..Default::default()
    }));
    let mut provider = MockProvider::new(1);
    let mut buffer = provider.lock_front_buffer().unwrap();

    let err = framebuffer_for(&mut buffer, &card).unwrap_err();
    assert!(matches!(err, DisplayError::FramebufferRegistrationFailed(_)));
    assert_eq!(buffer.framebuffer(), None);
}

#[test]
fn exhausted_surface_has_no_front_buffer() {
    let mut provider = MockProvider::new(1);
    let _held = provider.lock_front_buffer().unwrap();
    assert!(matches!(
        provider.lock_front_buffer(),
        Err(DisplayError::FrontBufferUnavailable)
    ));
}

// --- allocation policy ---

#[test]
fn modifier_path_is_tried_first() {
    let allocator = MockAllocator {
        modifiers_supported: true,
        ..Default::default()
    };
    let surface = allocate_surface(&allocator, &request(DrmModifier::I915_x_tiled)).unwrap();
    assert_eq!(surface, "modifiers");
    assert_eq!(*allocator.calls.borrow(), vec!["modifiers"]);
}

#[test]
fn linear_request_falls_back_to_plain_allocation() {
    let allocator = MockAllocator {
        modifiers_supported: true,
        fail_modifiers: true,
        ..Default::default()
    };
    let surface = allocate_surface(&allocator, &request(DrmModifier::Linear)).unwrap();
    assert_eq!(surface, "plain");
    assert_eq!(*allocator.calls.borrow(), vec!["modifiers", "plain"]);
}

#[test]
fn missing_modifier_support_is_not_an_error_for_linear() {
    let allocator = MockAllocator::default();
    let surface = allocate_surface(&allocator, &request(DrmModifier::Linear)).unwrap();
    assert_eq!(surface, "plain");
    assert_eq!(*allocator.calls.borrow(), vec!["plain"]);
}

#[test]
fn explicit_layout_without_modifier_path_is_unsupported() {
    let allocator = MockAllocator::default();
    let tiled = DrmModifier::from(0x0100_0000_0000_0004);
    let err = allocate_surface(&allocator, &request(tiled)).unwrap_err();
    assert!(matches!(
        err,
        DisplayError::UnsupportedLayout {
            modifier: 0x0100_0000_0000_0004
        }
    ));
    assert!(allocator.calls.borrow().is_empty());
}

#[test]
fn both_paths_failing_is_allocation_failure() {
    let allocator = MockAllocator {
        modifiers_supported: true,
        fail_modifiers: true,
        fail_plain: true,
        ..Default::default()
    };
    let err = allocate_surface(&allocator, &request(DrmModifier::Linear)).unwrap_err();
    assert!(matches!(
        err,
        DisplayError::BufferAllocationFailed {
            width: 1280,
            height: 720,
            ..
        }
    ));
}
