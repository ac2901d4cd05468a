#![no_main]

use aliro::definitions::messages::AliroCommand;
use aliro::presentation::endpoint::database::InMemoryDatabase;
use aliro::presentation::endpoint::UserDeviceProcessor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = AliroCommand::parse(data);
    // arbitrary input must always produce a response APDU
    let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
    assert!(processor.process_apdu(data).len() >= 2);
});
