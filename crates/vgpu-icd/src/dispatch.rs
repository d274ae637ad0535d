//! Dispatchable handle management for the Vulkan ICD.
//!
//! The Vulkan loader requires that dispatchable handles (VkInstance,
//! VkPhysicalDevice, VkDevice) have their first `sizeof(void*)` bytes free
//! for its dispatch table pointer. The loader writes this after the ICD
//! returns the handle.

use std::alloc::{alloc, Layout};

use ash::vk;

/// The ICD loader magic value. The loader expects this in new dispatchable handles.
pub const ICD_LOADER_MAGIC: usize = 0x01CDC0DE;

/// A dispatchable object: the loader's slot followed by our state.
#[repr(C)]
pub struct Dispatchable<T> {
    /// The loader will overwrite this with its dispatch table pointer.
    pub loader_data: usize,
    pub object: T,
}

impl<T> Dispatchable<T> {
    /// Allocate a new dispatchable object on the heap. Returns `None` when
    /// the allocation fails instead of aborting.
    pub fn new(object: T) -> Option<*mut Self> {
        let layout = Layout::new::<Self>();
        // SAFETY: `Self` always contains `loader_data`, so the layout is non-zero.
        let ptr = unsafe { alloc(layout) } as *mut Self;
        if ptr.is_null() {
            return None;
        }
        unsafe {
            ptr.write(Self {
                loader_data: ICD_LOADER_MAGIC,
                object,
            });
        }
        Some(ptr)
    }

    /// Borrow the object behind a dispatchable handle.
    ///
    /// # Safety
    /// `ptr` must be null or come from [`Dispatchable::new`] and not yet be
    /// destroyed.
    pub unsafe fn get<'a>(ptr: *const Self) -> Option<&'a T> {
        unsafe { ptr.as_ref() }.map(|d| &d.object)
    }

    /// Free a dispatchable object, returning what it held.
    ///
    /// # Safety
    /// The pointer must have been created by `Dispatchable::new` and not be
    /// used afterwards.
    pub unsafe fn destroy(ptr: *mut Self) -> T {
        // Same global allocator and layout as `new`.
        let boxed = unsafe { Box::from_raw(ptr) };
        boxed.object
    }
}

/// Conversions between our dispatchable pointers and ash handle types.
pub trait DispatchableHandle: vk::Handle + Copy {
    fn from_ptr<T>(ptr: *mut Dispatchable<T>) -> Self {
        Self::from_raw(ptr as u64)
    }

    fn as_ptr<T>(self) -> *mut Dispatchable<T> {
        self.as_raw() as *mut Dispatchable<T>
    }
}

impl DispatchableHandle for vk::Instance {}
impl DispatchableHandle for vk::PhysicalDevice {}
impl DispatchableHandle for vk::Device {}
