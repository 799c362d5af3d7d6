#![no_main]

use docspace::NavigationCursor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cursor) = s.parse::<NavigationCursor>() {
            assert_eq!(cursor.to_string(), s);
        }
        let _ = serde_json::from_str::<NavigationCursor>(s);
    }
});
