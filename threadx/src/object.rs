//! Kernel object support.
//!
//! Kernel objects are records the kernel works on in place: they live at a
//! fixed address from create to delete, and must never be copied or moved
//! while created.  Two storage arrangements satisfy that:
//!
//! - a [`StaticKernelObject`], declared through [`kobj_define!`], whose
//!   single usable wrapper is handed out by [`init_once`];
//! - a heap allocation pinned for its lifetime, available with the `alloc`
//!   feature through [`Fixed::new`].
//!
//! Either way the wrapper types hold a [`Fixed`] pointing at the record and
//! are themselves freely movable.
//!
//! [`init_once`]: StaticKernelObject::init_once

use core::cell::UnsafeCell;
use core::mem;

#[cfg(feature = "alloc")]
use alloc::boxed::Box;
#[cfg(feature = "alloc")]
use core::pin::Pin;

use portable_atomic::{AtomicUsize, Ordering};

/// A kernel object declared statically.
///
/// The record starts zero-filled, which every kernel object type accepts as
/// its not-created state.  The atomic tracks the one-shot initialization.
pub struct StaticKernelObject<T> {
    #[doc(hidden)]
    pub value: UnsafeCell<T>,
    #[doc(hidden)]
    pub init: AtomicUsize,
}

const KOBJ_UNINITIALIZED: usize = 0;
const KOBJ_INITING: usize = 1;
const KOBJ_INITIALIZED: usize = 2;

/// Connects a static kernel object to the wrapper type that manages it once
/// initialized.
pub trait Wrapped {
    /// The wrapper type returned by `init_once`.
    type T;
    /// Initializer argument, for objects whose create call is parameterized.
    type I;
    /// Create the kernel object in place and return its wrapper.
    fn get_wrapped(&self, args: Self::I) -> Self::T;
}

impl<T> StaticKernelObject<T>
where
    StaticKernelObject<T>: Wrapped,
{
    /// Construct an empty static kernel object.
    ///
    /// Not intended to be called directly; declared by [`kobj_define!`].
    #[allow(clippy::new_without_default)]
    pub const fn new() -> StaticKernelObject<T> {
        StaticKernelObject {
            value: UnsafeCell::new(unsafe { mem::zeroed() }),
            init: AtomicUsize::new(KOBJ_UNINITIALIZED),
        }
    }

    /// Get the wrapper for this object, initializing it in place.
    ///
    /// Returns the wrapper on the first call and `None` on every later one;
    /// there is exactly one usable handle to a static kernel object.
    pub fn init_once(&self, args: <Self as Wrapped>::I) -> Option<<Self as Wrapped>::T> {
        if self
            .init
            .compare_exchange(
                KOBJ_UNINITIALIZED,
                KOBJ_INITING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return None;
        }
        let result = self.get_wrapped(args);
        self.init.store(KOBJ_INITIALIZED, Ordering::Release);
        Some(result)
    }
}

/// The fixed-address home of a kernel object record.
///
/// Wrapper types hold one of these rather than the record itself, so the
/// wrappers stay movable while the record does not.
pub enum Fixed<T> {
    /// Points into a [`StaticKernelObject`].
    Static(*mut T),
    /// Owns a pinned heap allocation.
    #[cfg(feature = "alloc")]
    Boxed(Pin<Box<T>>),
}

impl<T> Fixed<T> {
    /// The address of the record, as the kernel calls want it.
    pub fn get(&self) -> *mut T {
        match self {
            Fixed::Static(ptr) => *ptr,
            #[cfg(feature = "alloc")]
            Fixed::Boxed(b) => b.as_ref().get_ref() as *const T as *mut T,
        }
    }

    /// Allocate a new record on the heap, pinned in place.
    #[cfg(feature = "alloc")]
    pub fn new(value: T) -> Fixed<T> {
        Fixed::Boxed(Box::pin(value))
    }
}

/// Declare static kernel objects.
///
/// ```
/// use threadx::kobj_define;
/// use threadx::sys::sync::{StaticMutex, StaticSemaphore};
/// use threadx::sys::thread::StaticThread;
///
/// kobj_define! {
///     static DONE: StaticSemaphore;
///     static LOCK: StaticMutex;
///     static WORKER: StaticThread;
///     static WORKER_STACK: StaticThreadStack<2048>;
/// }
/// ```
///
/// Each declared object yields its single wrapper through `init_once`.
#[macro_export]
macro_rules! kobj_define {
    ($(#[$m:meta])* $v:vis static $name:ident: StaticThreadStack<$size:literal>; $($rest:tt)*) => {
        $crate::_kobj_stack!($(#[$m])* $v $name, $size);
        $crate::kobj_define!($($rest)*);
    };
    ($(#[$m:meta])* $v:vis static $name:ident: $type:ty; $($rest:tt)*) => {
        $(#[$m])* $v static $name: $type = <$type>::new();
        $crate::kobj_define!($($rest)*);
    };
    () => {};
}

#[doc(hidden)]
#[macro_export]
macro_rules! _kobj_stack {
    ($(#[$m:meta])* $v:vis $name:ident, $size:literal) => {
        $crate::paste! {
            #[doc(hidden)]
            static [<_REAL_ $name>]:
                $crate::sys::thread::RealStaticThreadStack<{ $crate::sys::thread::stack_len($size) }> =
                unsafe { ::core::mem::zeroed() };
            $(#[$m])* $v static $name: $crate::_export::KStaticThreadStack =
                $crate::_export::KStaticThreadStack::new_from(&[<_REAL_ $name>]);
        }
    };
}
