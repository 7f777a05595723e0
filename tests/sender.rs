mod support;

use spoutcap_capture::capture::{FrameBuffer, TextureHandle};
use spoutcap_capture::sender::{FrameRef, FrameSender, Representation, SendError};

use support::{ChannelCall, MockChannel};

fn sender() -> (FrameSender<MockChannel>, MockChannel) {
    let channel = MockChannel::default();
    (FrameSender::new(channel.clone(), false), channel)
}

#[test]
fn publish_without_channel_is_refused() {
    let (mut sender, channel) = sender();
    let buffer = FrameBuffer::with_size(4, 4).unwrap();

    let err = sender.publish(FrameRef::pixels(&buffer), false).unwrap_err();
    assert!(matches!(err, SendError::NoActiveChannel));
    assert!(channel.calls().is_empty());
}

#[test]
fn mismatched_texture_resizes_channel_before_publish() {
    let (mut sender, channel) = sender();
    sender.activate("Desktop", 1920, 1080).unwrap();

    let texture = TextureHandle::new(0x1, 2560, 1440);
    let used = sender.publish(FrameRef::texture(texture), false).unwrap();

    assert_eq!(used, Representation::Texture);
    assert_eq!(sender.active_size(), Some((2560, 1440)));
    assert_eq!(
        channel.calls(),
        vec![
            ChannelCall::Create("Desktop".to_string(), 1920, 1080),
            ChannelCall::Resize("Desktop".to_string(), 2560, 1440),
            ChannelCall::Texture("Desktop".to_string(), 2560, 1440, false),
        ]
    );
}

#[test]
fn unchanged_size_does_not_resize() {
    let (mut sender, channel) = sender();
    sender.activate("Window", 8, 8).unwrap();
    sender.resize(8, 8).unwrap();

    assert_eq!(channel.calls().len(), 1);
}

#[test]
fn empty_buffer_is_rejected_not_truncated() {
    let (mut sender, channel) = sender();
    sender.activate("Window", 8, 8).unwrap();
    let empty = FrameBuffer::new();

    let err = sender.publish(FrameRef::pixels(&empty), false).unwrap_err();
    assert!(matches!(err, SendError::BufferSize { expected: 0, actual: 0 }));
    assert_eq!(channel.buffer_publishes(), 0);
    assert_eq!(sender.published_frames(), 0);
}

#[test]
fn frame_with_nothing_to_send_is_rejected() {
    let (mut sender, _channel) = sender();
    sender.activate("Window", 8, 8).unwrap();
    let frame = FrameRef {
        texture: None,
        pixels: None,
    };

    assert!(matches!(
        sender.publish(frame, true),
        Err(SendError::EmptyFrame)
    ));
}

#[test]
fn representation_follows_minimized_state_every_call() {
    let (mut sender, channel) = sender();
    sender.activate("Desktop", 4, 4).unwrap();
    let mut buffer = FrameBuffer::with_size(4, 4).unwrap();
    buffer.set_texture(Some(TextureHandle::new(0x2, 4, 4)));

    assert_eq!(
        sender.publish(FrameRef::from_buffer(&buffer), false).unwrap(),
        Representation::Texture
    );
    assert_eq!(
        sender.publish(FrameRef::from_buffer(&buffer), true).unwrap(),
        Representation::Buffer
    );
    assert_eq!(
        sender.publish(FrameRef::from_buffer(&buffer), false).unwrap(),
        Representation::Texture
    );
    assert_eq!(channel.texture_publishes(), 2);
    assert_eq!(channel.buffer_publishes(), 1);
    assert_eq!(sender.published_frames(), 3);
}

#[test]
fn activating_another_channel_releases_the_first() {
    let (mut sender, channel) = sender();
    sender.activate("Desktop", 4, 4).unwrap();
    sender.activate("Region", 2, 2).unwrap();

    assert_eq!(sender.active_name(), Some("Region"));
    assert_eq!(channel.declared("Desktop"), None);
    assert!(channel
        .calls()
        .contains(&ChannelCall::Release("Desktop".to_string())));
}
