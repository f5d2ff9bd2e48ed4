//! A safe wrapper around a raw `libz-sys` `z_stream` that surfaces block
//! boundaries, the sub-byte bit offset needed to resume mid-byte, and the
//! 32 KiB sliding-window dictionary.
//!
//! Drives `inflateInit2_` with window bits 47 for auto-detecting
//! zlib/gzip/concatenated-gzip framing, `inflate(..., Z_BLOCK)` to stop at
//! block boundaries, and `data_type` bit 7/bit 6 to tell a
//! completed-block-not-stream-end apart from a completed stream.

use std::ffi::CStr;
use std::mem;

use libz_sys::{
    inflate, inflateEnd, inflateGetDictionary, inflateInit2_, inflatePrime, inflateSetDictionary,
    uInt, z_stream, zlibVersion, Z_BLOCK, Z_BUF_ERROR, Z_DATA_ERROR, Z_MEM_ERROR, Z_NEED_DICT,
    Z_STREAM_END, Z_STREAM_ERROR,
};

use crate::constants::WINDOW_SIZE;
use crate::error::{FqixError, Result};

/// Window-bits argument for `inflateInit2`. 47 = 15 (max window) + 32
/// (auto-detect zlib/gzip headers, including concatenated gzip members).
const AUTO_DETECT_WINDOW_BITS: i32 = 15 + 32;

/// Negative window bits select raw, headerless DEFLATE -- required to
/// resume mid-stream with an externally supplied dictionary.
const RAW_WINDOW_BITS: i32 = -15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverMode {
    /// Accepts zlib or gzip framing, including concatenated gzip streams.
    /// Used while indexing.
    AutoDetect,
    /// Expects to resume mid-stream with a caller-supplied dictionary. Used
    /// while extracting.
    Raw,
}

/// Flush strategy passed to the underlying `inflate()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Stop no later than the end of a DEFLATE block -- what the indexer
    /// needs to detect boundaries.
    Block,
    /// Produce as much output as fits -- what the extractor needs once
    /// it's decoding a known range.
    None,
}

impl Flush {
    fn as_raw(self) -> i32 {
        match self {
            Flush::Block => Z_BLOCK,
            Flush::None => libz_sys::Z_NO_FLUSH,
        }
    }
}

/// Outcome of one `inflate()` call.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub consumed_in: usize,
    pub produced_out: usize,
    /// True when inflate stopped at the end of a block that is *not* the
    /// final block of the stream -- the spec's block-end predicate.
    pub at_block_end: bool,
    pub at_stream_end: bool,
    /// Number of unused bits (0-7) remaining in the last input byte
    /// consumed.
    pub bits: u8,
}

struct RawStream(Box<z_stream>);

impl RawStream {
    fn new(window_bits: i32) -> Result<Self> {
        let mut stream = Box::new(unsafe { mem::zeroed::<z_stream>() });
        stream.zalloc = zlib_default_alloc;
        stream.zfree = zlib_default_free;
        let ret = unsafe {
            inflateInit2_(
                stream.as_mut(),
                window_bits,
                zlibVersion(),
                mem::size_of::<z_stream>() as i32,
            )
        };
        check(ret, &stream, "inflateInit2")?;
        Ok(Self(stream))
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        unsafe {
            inflateEnd(self.0.as_mut());
        }
    }
}

/// `zalloc`/`zfree` left as `None` would be natural in C, but the
/// `libz-sys` binding requires non-null function pointers; fall back to the
/// ordinary global allocator, sized per zlib's `items * size` contract.
extern "C" fn zlib_default_alloc(
    _opaque: *mut libc::c_void,
    items: uInt,
    size: uInt,
) -> *mut libc::c_void {
    let total = items as usize * size as usize;
    unsafe { libc::calloc(1, total.max(1)) }
}

extern "C" fn zlib_default_free(_opaque: *mut libc::c_void, address: *mut libc::c_void) {
    unsafe {
        libc::free(address);
    }
}

fn check(ret: i32, stream: &z_stream, what: &str) -> Result<()> {
    if ret >= 0 || ret == Z_BUF_ERROR {
        return Ok(());
    }
    let msg = if stream.msg.is_null() {
        format!("zlib error {ret} during {what}")
    } else {
        unsafe { CStr::from_ptr(stream.msg).to_string_lossy().into_owned() }
    };
    match ret {
        Z_DATA_ERROR | Z_MEM_ERROR | Z_STREAM_ERROR => Err(FqixError::CorruptSource(msg)),
        _ => Err(FqixError::DecoderInit(msg)),
    }
}

/// The framing observer itself. Owns exactly one `z_stream`; a new instance
/// is created whenever the underlying stream is torn down and reinitialized
/// (concatenated-member continuation in both the indexer and extractor).
pub struct FramingObserver {
    stream: RawStream,
}

impl FramingObserver {
    pub fn new(mode: ObserverMode) -> Result<Self> {
        let window_bits = match mode {
            ObserverMode::AutoDetect => AUTO_DETECT_WINDOW_BITS,
            ObserverMode::Raw => RAW_WINDOW_BITS,
        };
        Ok(Self { stream: RawStream::new(window_bits)? })
    }

    /// Feeds `input` to the decoder and fills as much of `output` as a
    /// single `inflate()` call produces under `flush`.
    pub fn step(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> Result<StepOutcome> {
        let strm = self.stream.0.as_mut();
        strm.next_in = input.as_ptr() as *mut u8;
        strm.avail_in = input.len() as uInt;
        strm.next_out = output.as_mut_ptr();
        strm.avail_out = output.len() as uInt;

        let ret = unsafe { inflate(strm, flush.as_raw()) };
        let ret = if ret == Z_NEED_DICT { Z_DATA_ERROR } else { ret };
        check(ret, strm, "inflate")?;

        let consumed_in = input.len() - strm.avail_in as usize;
        let produced_out = output.len() - strm.avail_out as usize;
        let at_stream_end = ret == Z_STREAM_END;
        let data_type = strm.data_type;
        let at_block_end = (data_type & 128) != 0 && (data_type & 64) == 0;
        let bits = (data_type & 7) as u8;

        Ok(StepOutcome { consumed_in, produced_out, at_block_end, at_stream_end, bits })
    }

    /// Captures the 32 KiB sliding-window dictionary as it stands right
    /// now, zero-padded at the *start* if fewer than 32 KiB have been
    /// produced yet -- matching the spec's padding rule.
    pub fn dictionary(&mut self) -> Result<[u8; WINDOW_SIZE]> {
        let mut raw = [0u8; WINDOW_SIZE];
        let mut len: uInt = 0;
        let strm = self.stream.0.as_mut();
        let ret = unsafe { inflateGetDictionary(strm, raw.as_mut_ptr(), &mut len) };
        check(ret, strm, "inflateGetDictionary")?;

        let len = len as usize;
        if len == WINDOW_SIZE {
            return Ok(raw);
        }
        let mut padded = [0u8; WINDOW_SIZE];
        padded[WINDOW_SIZE - len..].copy_from_slice(&raw[..len]);
        Ok(padded)
    }

    /// Primes the decoder with `bits` unused bits carried over from the
    /// previous byte -- the top `bits` bits of `byte_value`.
    pub fn prime(&mut self, bits: u8, byte_value: u8) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        let value = (byte_value >> (8 - bits)) as i32;
        let strm = self.stream.0.as_mut();
        let ret = unsafe { inflatePrime(strm, bits as i32, value) };
        check(ret, strm, "inflatePrime")
    }

    pub fn set_dictionary(&mut self, dictionary: &[u8; WINDOW_SIZE]) -> Result<()> {
        let strm = self.stream.0.as_mut();
        let ret = unsafe { inflateSetDictionary(strm, dictionary.as_ptr(), WINDOW_SIZE as uInt) };
        check(ret, strm, "inflateSetDictionary")
    }
}

// SAFETY: the boxed z_stream and its allocator callbacks hold no
// thread-affine state; the spec requires one codec instance never be
// shared *concurrently* across threads, which `&mut self` on every mutating
// method already enforces.
unsafe impl Send for FramingObserver {}
