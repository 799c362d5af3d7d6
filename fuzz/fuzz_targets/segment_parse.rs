#![no_main]

use docspace::PathSegment;
use libfuzzer_sys::fuzz_target;
use std::path::{Component, Path};

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    if let Ok(segment) = PathSegment::parse(&s) {
        let mut components = Path::new(segment.as_str()).components();
        assert!(matches!(components.next(), Some(Component::Normal(_))));
        assert!(components.next().is_none());
    }
    if PathSegment::directory_name(&s).is_ok() {
        assert!(PathSegment::parse(&s).is_ok());
    }
});
