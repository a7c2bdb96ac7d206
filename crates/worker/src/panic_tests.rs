use std::panic::{AssertUnwindSafe, catch_unwind};

use super::panic_message;

#[test]
fn extracts_static_str_payload() {
	let payload = catch_unwind(|| panic!("boom-str")).unwrap_err();
	let msg = panic_message(payload.as_ref()).expect("should carry a message");
	assert!(msg.contains("boom-str"), "expected 'boom-str', got: {msg}");
}

#[test]
fn extracts_string_payload() {
	let payload = catch_unwind(|| panic!("{}", String::from("boom-string"))).unwrap_err();
	let msg = panic_message(payload.as_ref()).expect("should carry a message");
	assert!(msg.contains("boom-string"), "expected 'boom-string', got: {msg}");
}

#[test]
fn returns_none_for_opaque_payload() {
	let payload = catch_unwind(AssertUnwindSafe(|| std::panic::panic_any(42_u32))).unwrap_err();
	assert!(panic_message(payload.as_ref()).is_none());
}
