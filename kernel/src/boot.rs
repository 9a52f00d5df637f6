//! Multiboot2 handoff.
//!
//! The loader leaves the magic value in the first argument register and
//! a pointer to the info blob in the second. The blob is a `total_size`
//! header followed by 8-byte-aligned tags; this module walks it once,
//! pulls out the pieces the kernel consumes, and keeps a borrow of the
//! blob for the lazily-walked parts (modules).
//!
//! Nothing here allocates; parsing runs before the heap exists.

use core::mem::size_of;

/// EAX value a compliant loader hands to the kernel.
pub const BOOTLOADER_MAGIC: u32 = 0x36D7_6289;

// Tag types the kernel consumes.
const TAG_END: u32 = 0;
const TAG_CMDLINE: u32 = 1;
const TAG_BOOTLOADER_NAME: u32 = 2;
const TAG_MODULE: u32 = 3;
const TAG_MMAP: u32 = 6;
const TAG_FRAMEBUFFER: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy)]
struct TagHeader {
    typ: u32,
    size: u32,
}

/// One memory-map entry. Type 1 is usable RAM; everything else is
/// treated as a hole.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MmapEntry {
    pub addr: u64,
    pub len: u64,
    pub typ: u32,
    pub reserved: u32,
}

impl MmapEntry {
    pub fn is_usable(&self) -> bool {
        self.typ == 1
    }
}

/// View of the mmap tag's entry array. `entry_size` comes from the tag
/// and may exceed `size_of::<MmapEntry>()`, so entries are stepped by it
/// rather than treated as a plain slice.
#[derive(Clone, Copy)]
pub struct MmapView {
    base: *const u8,
    count: usize,
    entry_size: usize,
}

impl MmapView {
    const EMPTY: MmapView = MmapView {
        base: core::ptr::null(),
        count: 0,
        entry_size: size_of::<MmapEntry>(),
    };

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MmapEntry> + '_ {
        let view = *self;
        (0..view.count).map(move |i| unsafe {
            (view.base.add(i * view.entry_size) as *const MmapEntry).read_unaligned()
        })
    }
}

/// A boot module: a file the loader placed in memory for us.
#[derive(Clone, Copy, Debug)]
pub struct Module {
    pub start: u32,
    pub end: u32,
}

/// Linear framebuffer descriptor, when the loader set one up.
#[derive(Clone, Copy, Debug, Default)]
pub struct Framebuffer {
    pub addr: u64,
    pub pitch: u32,
    pub width: u32,
    pub height: u32,
    pub bpp: u8,
}

/// Everything the rest of the kernel needs from the handoff.
pub struct BootInfo {
    blob: &'static [u8],
    pub cmdline: Option<&'static str>,
    pub bootloader: Option<&'static str>,
    pub mmap: MmapView,
    pub framebuffer: Option<Framebuffer>,
    pub module_count: usize,
}

impl BootInfo {
    /// Walk the module tags. Kept lazy so [`parse`] stays allocation-free.
    pub fn modules(&self) -> impl Iterator<Item = Module> + '_ {
        TagIter::new(self.blob).filter_map(|(typ, body)| {
            if typ == TAG_MODULE && body.len() >= 8 {
                Some(Module {
                    start: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                    end: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                })
            } else {
                None
            }
        })
    }
}

/// Iterator over `(type, body)` pairs of the tag list. Stops at the end
/// tag or at the first tag that claims to run past the blob.
struct TagIter<'a> {
    blob: &'a [u8],
    offset: usize,
}

impl<'a> TagIter<'a> {
    fn new(blob: &'a [u8]) -> TagIter<'a> {
        TagIter { blob, offset: 8 }
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + size_of::<TagHeader>() > self.blob.len() {
            return None;
        }
        let header = unsafe {
            (self.blob.as_ptr().add(self.offset) as *const TagHeader).read_unaligned()
        };
        if header.typ == TAG_END {
            return None;
        }
        let size = header.size as usize;
        if size < size_of::<TagHeader>() || self.offset + size > self.blob.len() {
            return None;
        }
        let body = &self.blob[self.offset + size_of::<TagHeader>()..self.offset + size];
        self.offset += (size + 7) & !7;
        Some((header.typ, body))
    }
}

/// NUL-terminated, UTF-8, non-empty string from a tag body.
fn tag_str(body: &'static [u8]) -> Option<&'static str> {
    let len = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let s = core::str::from_utf8(&body[..len]).ok()?;
    (!s.is_empty()).then_some(s)
}

/// Parse the info blob at `mbi`. Returns `None` for a null, misaligned,
/// or structurally broken blob.
///
/// # Safety
///
/// `mbi` must point to a Multiboot2 info structure that stays mapped and
/// untouched for the kernel's lifetime.
pub unsafe fn parse(mbi: *const u8) -> Option<BootInfo> {
    if mbi.is_null() || (mbi as usize) % 8 != 0 {
        return None;
    }
    let total_size = unsafe { (mbi as *const u32).read() } as usize;
    if total_size < 16 {
        return None;
    }
    let blob: &'static [u8] = unsafe { core::slice::from_raw_parts(mbi, total_size) };

    let mut info = BootInfo {
        blob,
        cmdline: None,
        bootloader: None,
        mmap: MmapView::EMPTY,
        framebuffer: None,
        module_count: 0,
    };

    for (typ, body) in TagIter::new(blob) {
        match typ {
            TAG_CMDLINE => info.cmdline = tag_str(body),
            TAG_BOOTLOADER_NAME => info.bootloader = tag_str(body),
            TAG_MODULE => info.module_count += 1,
            TAG_MMAP => {
                // Body: entry_size u32, entry_version u32, then entries.
                if body.len() >= 8 {
                    let entry_size =
                        u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
                    if entry_size >= size_of::<MmapEntry>() && body.len() > 8 {
                        info.mmap = MmapView {
                            base: body[8..].as_ptr(),
                            count: (body.len() - 8) / entry_size,
                            entry_size,
                        };
                    }
                }
            }
            TAG_FRAMEBUFFER => {
                if body.len() >= 21 {
                    info.framebuffer = Some(Framebuffer {
                        addr: u64::from_le_bytes(body[0..8].try_into().unwrap()),
                        pitch: u32::from_le_bytes(body[8..12].try_into().unwrap()),
                        width: u32::from_le_bytes(body[12..16].try_into().unwrap()),
                        height: u32::from_le_bytes(body[16..20].try_into().unwrap()),
                        bpp: body[20],
                    });
                }
            }
            _ => {}
        }
    }

    Some(info)
}
