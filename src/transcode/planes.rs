//! Planar sample access and re-framing
//!
//! `ffmpeg-next`'s `Audio::data(index)` stops counting planes when
//! `linesize[1] == 0`, which FFmpeg leaves unset for planar audio. These
//! helpers read the plane pointers directly. All `unsafe` for frame data
//! lives here.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

fn plane_bytes(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: the frame owns `extended_data` for its lifetime; the plane
    // pointer is checked for null and `linesize[0]` is the size of every
    // plane of planar audio.
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;
        if index >= channels || (!frame.format().is_planar() && index > 0) {
            return &[];
        }
        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }
        let plane = *ptrs.add(index);
        if plane.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(plane, (*f).linesize[0] as usize)
    }
}

fn plane_bytes_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: as for `plane_bytes`, with exclusive access through `&mut`.
    unsafe {
        let f = frame.as_mut_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;
        if index >= channels || (!frame.format().is_planar() && index > 0) {
            return &mut [];
        }
        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }
        let plane = *ptrs.add(index);
        if plane.is_null() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(plane, (*f).linesize[0] as usize)
    }
}

/// First `samples` values of an FLTP plane, or `None` on a short or
/// misaligned plane.
pub fn fltp_plane(frame: &ffmpeg::util::frame::Audio, index: usize, samples: usize) -> Option<&[f32]> {
    let bytes = plane_bytes(frame, index);
    if bytes.len() < samples.checked_mul(4)? {
        return None;
    }
    let ptr = bytes.as_ptr();
    if ptr as usize % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: length and alignment checked above; FLTP planes hold native
    // endian f32 values.
    Some(unsafe { std::slice::from_raw_parts(ptr as *const f32, samples) })
}

pub fn fltp_plane_mut(
    frame: &mut ffmpeg::util::frame::Audio,
    index: usize,
    samples: usize,
) -> Option<&mut [f32]> {
    let bytes = plane_bytes_mut(frame, index);
    if bytes.len() < samples.checked_mul(4)? {
        return None;
    }
    let ptr = bytes.as_mut_ptr();
    if ptr as usize % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, samples) })
}

/// Per-channel sample queue that hands out fixed-size chunks.
///
/// Resampled frames rarely line up with the encoder's frame size, so
/// samples are buffered here and drained `frame_size` at a time.
#[derive(Debug)]
pub struct SampleFifo {
    planes: Vec<Vec<f32>>,
    frame_size: usize,
}

impl SampleFifo {
    pub fn new(channels: usize, frame_size: usize) -> Self {
        Self {
            planes: vec![Vec::new(); channels.max(1)],
            frame_size: frame_size.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Samples queued per channel
    pub fn len(&self) -> usize {
        self.planes[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one slice per channel. All slices must have the same length.
    pub fn push_planes(&mut self, planes: &[&[f32]]) {
        for (queue, samples) in self.planes.iter_mut().zip(planes) {
            queue.extend_from_slice(samples);
        }
    }

    /// Next full chunk, or the remaining tail when `drain` is set.
    pub fn pop_chunk(&mut self, drain: bool) -> Option<Vec<Vec<f32>>> {
        let available = self.len();
        let n = if available >= self.frame_size {
            self.frame_size
        } else if drain && available > 0 {
            available
        } else {
            return None;
        };
        Some(self.planes.iter_mut().map(|q| q.drain(..n).collect()).collect())
    }

    /// Queue the planes of an FLTP frame.
    pub fn push_frame(&mut self, frame: &ffmpeg::util::frame::Audio) -> bool {
        let n = frame.samples();
        let mut planes = Vec::with_capacity(self.channels());
        for ch in 0..self.channels() {
            match fltp_plane(frame, ch, n) {
                Some(p) => planes.push(p),
                None => return false,
            }
        }
        self.push_planes(&planes);
        true
    }

    /// Next chunk as an FLTP frame stamped with `pts`.
    pub fn pop_frame(
        &mut self,
        drain: bool,
        rate: u32,
        layout: ChannelLayout,
        pts: i64,
    ) -> Option<ffmpeg::util::frame::Audio> {
        let chunk = self.pop_chunk(drain)?;
        let n = chunk[0].len();
        let mut frame = ffmpeg::util::frame::Audio::new(
            Sample::F32(ffmpeg::util::format::sample::Type::Planar),
            n,
            layout,
        );
        frame.set_rate(rate);
        frame.set_pts(Some(pts));
        for (ch, samples) in chunk.iter().enumerate() {
            fltp_plane_mut(&mut frame, ch, n)?.copy_from_slice(samples);
        }
        Some(frame)
    }
}
