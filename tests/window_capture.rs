mod support;

use spoutcap_capture::capture::{WindowCaptureSource, WindowHandle, WindowTarget};
use spoutcap_capture::sender::{FrameRef, FrameSender};
use spoutcap_capture::window_filter::{TargetFilter, TargetFilterSettings};

use support::{handle, MockChannel, MockWindows};

const HOST: isize = 0x10;
const TARGET: isize = 0x20;
const CONSOLE: isize = 0x30;

struct Fixture {
    windows: MockWindows,
    source: WindowCaptureSource,
    sender: FrameSender<MockChannel>,
    channel: MockChannel,
}

fn fixture() -> Fixture {
    let windows = MockWindows::default();
    windows.add(HOST, "SpoutCapHostWindow", "SpoutCap", (640, 360));
    windows.add(TARGET, "Notepad", "Notes", (320, 200));
    windows.add(CONSOLE, "ConsoleWindowClass", "cmd.exe", (320, 200));

    let channel = MockChannel::default();
    let mut sender = FrameSender::new(channel.clone(), false);
    sender.activate("Window", 320, 200).unwrap();

    Fixture {
        windows,
        source: WindowCaptureSource::new(TargetFilter::new(
            TargetFilterSettings::default(),
            Some(handle(HOST)),
        )),
        sender,
        channel,
    }
}

/// Size the buffer for `raw`, capture, and publish when the capture succeeds
fn capture_and_publish(fx: &mut Fixture, raw: Option<isize>) -> bool {
    let mut target = match raw.and_then(WindowHandle::from_raw) {
        Some(h) => WindowTarget::new(h, 320, 200),
        None => WindowTarget::none(),
    };
    fx.source.refresh_size(&mut target, &fx.windows).unwrap();
    // Dead and missing targets leave the buffer unsized; size it so only
    // the filter can refuse them.
    if !fx.source.buffer().is_allocated() {
        let mut sized = WindowTarget::new(handle(TARGET), 320, 200);
        fx.source.refresh_size(&mut sized, &fx.windows).unwrap();
    }

    let captured = fx.source.capture(&target, &fx.windows);
    if captured {
        fx.sender
            .publish(FrameRef::pixels(fx.source.buffer()), false)
            .unwrap();
    }
    captured
}

#[test]
fn live_target_is_captured_and_published() {
    let mut fx = fixture();
    assert!(capture_and_publish(&mut fx, Some(TARGET)));
    assert_eq!(fx.sender.published_frames(), 1);
    assert_eq!(fx.windows.blits(), vec![(TARGET, 320, 200)]);
    assert!(fx.source.buffer().pixels().iter().all(|b| *b == 0x42));
}

#[test]
fn null_handle_is_rejected() {
    let mut fx = fixture();
    assert!(!capture_and_publish(&mut fx, None));
    assert_eq!(fx.sender.published_frames(), 0);
    assert_eq!(fx.channel.buffer_publishes(), 0);
}

#[test]
fn own_window_is_rejected() {
    let mut fx = fixture();
    assert!(!capture_and_publish(&mut fx, Some(HOST)));
    assert_eq!(fx.sender.published_frames(), 0);
    assert!(fx.windows.blits().is_empty());
}

#[test]
fn console_window_is_rejected() {
    let mut fx = fixture();
    assert!(!capture_and_publish(&mut fx, Some(CONSOLE)));
    assert_eq!(fx.sender.published_frames(), 0);
    assert!(fx.windows.blits().is_empty());
}

#[test]
fn dead_handle_is_rejected() {
    let mut fx = fixture();
    fx.windows.close(TARGET);
    assert!(!capture_and_publish(&mut fx, Some(TARGET)));
    assert_eq!(fx.sender.published_frames(), 0);
    assert!(fx.windows.blits().is_empty());
}

#[test]
fn pending_resize_skips_capture_until_buffer_follows() {
    let mut fx = fixture();
    let mut target = WindowTarget::new(handle(TARGET), 320, 200);
    fx.source.refresh_size(&mut target, &fx.windows).unwrap();

    fx.windows.resize(TARGET, (400, 300));
    assert!(!fx.source.capture(&target, &fx.windows));

    let resized = fx.source.refresh_size(&mut target, &fx.windows).unwrap();
    assert_eq!(resized, Some((400, 300)));
    assert_eq!((target.last_known_width, target.last_known_height), (400, 300));
    assert!(fx.source.capture(&target, &fx.windows));
    assert_eq!(fx.source.buffer().pixels().len(), 400 * 300 * 4);
}

#[test]
fn minimized_target_keeps_previous_buffer() {
    let mut fx = fixture();
    let mut target = WindowTarget::new(handle(TARGET), 320, 200);
    fx.source.refresh_size(&mut target, &fx.windows).unwrap();

    fx.windows.resize(TARGET, (0, 0));
    assert_eq!(fx.source.refresh_size(&mut target, &fx.windows).unwrap(), None);
    assert_eq!(fx.source.buffer().size(), (320, 200));
}
