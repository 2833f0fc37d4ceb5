#![cfg_attr(all(feature = "no-std", not(test)), no_std)]

extern crate alloc;

pub mod collections;

cfg_if::cfg_if! {
    if #[cfg(any(not(feature = "no-std"), test))] {
        pub mod env;
        pub mod opt;
        pub mod processor;
    }
}
