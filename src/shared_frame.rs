//! Memory layout of a shared-frame channel
//!
//! A channel is one named mapping: a fixed [`SharedFrameHeader`] followed by
//! room for a BGRA frame. Texture publishes leave the payload alone and only
//! record the shared texture handle.
//!
//! Mappings are sized to a capacity ceiling (the virtual screen) so that a
//! resize only rewrites the header and readers keep the name they opened.
//! A frame larger than the capacity needs a new mapping; if a reader still
//! holds the old one, its header gets a `relocated_to` pointer.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::capture::frame_buffer::BYTES_PER_PIXEL;
use crate::config;

/// "SPCP"
pub const HEADER_MAGIC: u32 = 0x5043_5053;
pub const HEADER_VERSION: u32 = 2;

/// DXGI_FORMAT_B8G8R8A8_UNORM
pub const FORMAT_BGRA8: u32 = 87;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PayloadKind {
    Empty = 0,
    Texture = 1,
    Buffer = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq, Eq)]
pub struct SharedFrameHeader {
    pub magic: u32,
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    /// Non-zero: receivers should flip the texture vertically
    pub flip: u32,
    pub frame_counter: u64,
    pub payload_kind: u32,
    /// Non-zero: the channel moved to name suffix `relocated_to - 1`
    pub relocated_to: u32,
    /// Legacy shared handle of the D3D11 texture, when `payload_kind` is texture
    pub texture_handle: u64,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<SharedFrameHeader>();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("mapping is {actual} bytes, {required} required")]
    TooSmall { required: usize, actual: usize },
    #[error("payload is {actual} bytes for a {width}x{height} frame")]
    PayloadSize { width: u32, height: u32, actual: usize },
    #[error("mapping does not start with a SpoutCap header")]
    BadMagic,
}

impl SharedFrameHeader {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            magic: HEADER_MAGIC,
            version: HEADER_VERSION,
            width,
            height,
            format: FORMAT_BGRA8,
            flip: 0,
            frame_counter: 0,
            payload_kind: PayloadKind::Empty as u32,
            relocated_to: 0,
            texture_handle: 0,
        }
    }

    /// Name suffix the channel continues under, if this mapping was abandoned
    pub fn relocation(&self) -> Option<u32> {
        self.relocated_to.checked_sub(1)
    }
}

/// How a channel's mapping follows a new frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Frame fits: rewrite the header, keep the mapping and its name
    InPlace,
    /// Frame exceeds the mapping; a new one of `capacity` bytes is needed
    Grow { capacity: usize },
}

/// Bytes needed for a channel of `width x height`
pub fn mapping_size(width: u32, height: u32) -> usize {
    HEADER_SIZE + width as usize * height as usize * BYTES_PER_PIXEL
}

/// Bytes to reserve for a channel showing `width x height` now and anything
/// up to `ceiling` later
pub fn channel_capacity(width: u32, height: u32, ceiling: (u32, u32)) -> usize {
    mapping_size(width.max(ceiling.0), height.max(ceiling.1))
}

pub fn plan_resize(capacity: usize, width: u32, height: u32, ceiling: (u32, u32)) -> ResizePlan {
    if mapping_size(width, height) <= capacity {
        ResizePlan::InPlace
    } else {
        ResizePlan::Grow {
            capacity: channel_capacity(width, height, ceiling),
        }
    }
}

/// Mapping name for a channel; `suffix` disambiguates collisions
pub fn mapping_name(channel: &str, suffix: u32) -> String {
    if suffix == 0 {
        format!("{}{}", config::channel::MAPPING_PREFIX, channel)
    } else {
        format!("{}{}_{}", config::channel::MAPPING_PREFIX, channel, suffix)
    }
}

pub fn read_header(mapping: &[u8]) -> Result<SharedFrameHeader, LayoutError> {
    let bytes = mapping.get(..HEADER_SIZE).ok_or(LayoutError::TooSmall {
        required: HEADER_SIZE,
        actual: mapping.len(),
    })?;
    let header: SharedFrameHeader = bytemuck::pod_read_unaligned(bytes);
    if header.magic != HEADER_MAGIC {
        return Err(LayoutError::BadMagic);
    }
    Ok(header)
}

fn check_capacity(mapping: &[u8], width: u32, height: u32) -> Result<(), LayoutError> {
    let required = mapping_size(width, height);
    if mapping.len() < required {
        return Err(LayoutError::TooSmall {
            required,
            actual: mapping.len(),
        });
    }
    Ok(())
}

/// Write the header of a new mapping. `frame_counter` carries on from the
/// mapping this one replaces, zero for a brand-new channel.
pub fn init_mapping(
    mapping: &mut [u8],
    width: u32,
    height: u32,
    frame_counter: u64,
) -> Result<(), LayoutError> {
    check_capacity(mapping, width, height)?;
    let header = SharedFrameHeader {
        frame_counter,
        ..SharedFrameHeader::new(width, height)
    };
    write_header(mapping, &header);
    Ok(())
}

/// Declare a new frame size in an existing mapping. The frame counter is
/// kept; the payload is marked empty until the next publish.
pub fn resize_in_place(mapping: &mut [u8], width: u32, height: u32) -> Result<u64, LayoutError> {
    check_capacity(mapping, width, height)?;
    let counter = match read_header(mapping) {
        Ok(header) => header.frame_counter,
        Err(LayoutError::BadMagic) => 0,
        Err(e) => return Err(e),
    };
    init_mapping(mapping, width, height, counter)?;
    Ok(counter)
}

/// Point readers of an abandoned mapping at the suffix the channel moved to.
/// The counter is bumped so polling readers notice.
pub fn mark_relocated(mapping: &mut [u8], suffix: u32) -> Result<(), LayoutError> {
    let mut header = read_header(mapping)?;
    header.relocated_to = suffix.saturating_add(1);
    header.payload_kind = PayloadKind::Empty as u32;
    header.frame_counter = header.frame_counter.wrapping_add(1);
    write_header(mapping, &header);
    Ok(())
}

/// Frame counter of a mapping, zero when it has no valid header
pub fn frame_counter(mapping: &[u8]) -> u64 {
    read_header(mapping).map_or(0, |header| header.frame_counter)
}

fn write_header(mapping: &mut [u8], header: &SharedFrameHeader) {
    mapping[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(header));
}

/// Copy a pixel frame in and bump the counter. Returns the new counter.
pub fn write_buffer(mapping: &mut [u8], pixels: &[u8], width: u32, height: u32) -> Result<u64, LayoutError> {
    let mut header = read_header(mapping)?;
    let payload = width as usize * height as usize * BYTES_PER_PIXEL;
    if pixels.len() != payload {
        return Err(LayoutError::PayloadSize {
            width,
            height,
            actual: pixels.len(),
        });
    }
    let required = HEADER_SIZE + payload;
    if mapping.len() < required {
        return Err(LayoutError::TooSmall {
            required,
            actual: mapping.len(),
        });
    }

    mapping[HEADER_SIZE..required].copy_from_slice(pixels);
    header.width = width;
    header.height = height;
    header.flip = 0;
    header.payload_kind = PayloadKind::Buffer as u32;
    header.frame_counter = header.frame_counter.wrapping_add(1);
    write_header(mapping, &header);
    Ok(header.frame_counter)
}

/// Record a texture publish. Returns the new counter.
pub fn write_texture(
    mapping: &mut [u8],
    texture_handle: u64,
    width: u32,
    height: u32,
    flip_vertical: bool,
) -> Result<u64, LayoutError> {
    let mut header = read_header(mapping)?;
    header.width = width;
    header.height = height;
    header.flip = flip_vertical as u32;
    header.payload_kind = PayloadKind::Texture as u32;
    header.texture_handle = texture_handle;
    header.frame_counter = header.frame_counter.wrapping_add(1);
    write_header(mapping, &header);
    Ok(header.frame_counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_stable() {
        assert_eq!(HEADER_SIZE, 48);
        assert_eq!(mapping_size(2, 2), 48 + 16);
    }

    #[test]
    fn mapping_names_get_suffixes() {
        assert_eq!(mapping_name("Desktop", 0), "SpoutCap.Desktop");
        assert_eq!(mapping_name("Desktop", 2), "SpoutCap.Desktop_2");
    }

    #[test]
    fn buffer_publish_writes_payload_and_counts() {
        let mut mapping = vec![0u8; mapping_size(2, 1)];
        init_mapping(&mut mapping, 2, 1, 0).unwrap();
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(write_buffer(&mut mapping, &pixels, 2, 1), Ok(1));
        assert_eq!(write_buffer(&mut mapping, &pixels, 2, 1), Ok(2));

        let header = read_header(&mapping).unwrap();
        assert_eq!(header.payload_kind, PayloadKind::Buffer as u32);
        assert_eq!(&mapping[HEADER_SIZE..], &pixels);
    }

    #[test]
    fn texture_publish_records_handle_and_flip() {
        let mut mapping = vec![0u8; mapping_size(4, 4)];
        init_mapping(&mut mapping, 4, 4, 0).unwrap();
        write_texture(&mut mapping, 0xBEEF, 4, 4, true).unwrap();
        let header = read_header(&mapping).unwrap();
        assert_eq!(header.texture_handle, 0xBEEF);
        assert_eq!(header.flip, 1);
        assert_eq!(header.payload_kind, PayloadKind::Texture as u32);
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut mapping = vec![0u8; mapping_size(2, 2)];
        init_mapping(&mut mapping, 2, 2, 0).unwrap();
        assert!(matches!(
            write_buffer(&mut mapping, &[0; 8], 2, 2),
            Err(LayoutError::PayloadSize { .. })
        ));
        assert_eq!(read_header(&vec![0u8; HEADER_SIZE]), Err(LayoutError::BadMagic));
    }

    #[test]
    fn counter_survives_in_place_resize() {
        let mut mapping = vec![0u8; mapping_size(4, 4)];
        init_mapping(&mut mapping, 4, 4, 0).unwrap();
        write_buffer(&mut mapping, &[0; 64], 4, 4).unwrap();
        write_buffer(&mut mapping, &[0; 64], 4, 4).unwrap();

        assert_eq!(resize_in_place(&mut mapping, 2, 2), Ok(2));
        let header = read_header(&mapping).unwrap();
        assert_eq!((header.width, header.height), (2, 2));
        assert_eq!(header.payload_kind, PayloadKind::Empty as u32);

        assert_eq!(write_buffer(&mut mapping, &[0; 16], 2, 2), Ok(3));
    }

    #[test]
    fn in_place_resize_refuses_frames_beyond_capacity() {
        let mut mapping = vec![0u8; mapping_size(2, 2)];
        init_mapping(&mut mapping, 2, 2, 0).unwrap();
        assert!(matches!(
            resize_in_place(&mut mapping, 4, 4),
            Err(LayoutError::TooSmall { .. })
        ));
        assert_eq!(read_header(&mapping).unwrap().width, 2);
    }

    #[test]
    fn window_growing_within_the_screen_keeps_its_mapping() {
        let screen = (1920, 1080);
        let capacity = channel_capacity(800, 600, screen);
        assert_eq!(capacity, mapping_size(1920, 1080));

        assert_eq!(plan_resize(capacity, 1024, 768, screen), ResizePlan::InPlace);
        assert_eq!(plan_resize(capacity, 1920, 1080, screen), ResizePlan::InPlace);
        assert_eq!(plan_resize(capacity, 1080, 1920, screen), ResizePlan::InPlace);
    }

    #[test]
    fn frame_beyond_the_ceiling_plans_a_bigger_mapping() {
        let screen = (1920, 1080);
        let capacity = channel_capacity(800, 600, screen);
        assert_eq!(
            plan_resize(capacity, 2560, 1440, screen),
            ResizePlan::Grow {
                capacity: mapping_size(2560, 1440)
            }
        );
        assert_eq!(
            plan_resize(capacity, 4000, 500, screen),
            ResizePlan::Grow {
                capacity: mapping_size(4000, 1080)
            }
        );
    }

    #[test]
    fn grown_mapping_continues_the_counter() {
        let mut old = vec![0u8; mapping_size(2, 2)];
        init_mapping(&mut old, 2, 2, 0).unwrap();
        write_buffer(&mut old, &[0; 16], 2, 2).unwrap();

        let mut grown = vec![0u8; mapping_size(4, 4)];
        init_mapping(&mut grown, 4, 4, frame_counter(&old)).unwrap();
        assert_eq!(write_buffer(&mut grown, &[0; 64], 4, 4), Ok(2));
    }

    #[test]
    fn abandoned_mapping_points_at_new_suffix() {
        let mut mapping = vec![0u8; mapping_size(2, 2)];
        init_mapping(&mut mapping, 2, 2, 5).unwrap();
        assert_eq!(read_header(&mapping).unwrap().relocation(), None);

        mark_relocated(&mut mapping, 1).unwrap();
        let header = read_header(&mapping).unwrap();
        assert_eq!(header.relocation(), Some(1));
        assert_eq!(header.frame_counter, 6);
        assert_eq!(
            mapping_name("Window", header.relocation().unwrap()),
            "SpoutCap.Window_1"
        );
    }
}
