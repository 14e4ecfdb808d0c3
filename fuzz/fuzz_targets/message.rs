#![no_main]

use catchment_mime::{AttachmentStorage, ParseOptions, parse_message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let storage = AttachmentStorage::Memory;
    let _ = parse_message(
        data,
        &ParseOptions {
            storage: &storage,
            connection_id: "fuzz",
            include_raw: true,
        },
    );
});
