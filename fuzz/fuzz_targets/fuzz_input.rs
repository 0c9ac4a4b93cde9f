// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use presetvault::history::{format_entry, parse_target_time, ChangeEntry};
use presetvault::preset::{diff_presets, into_preset};
use presetvault::undo::UndoSnapshot;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    history_line: &'a str,
    undo_file: &'a str,
    target_time: &'a str,
    left: &'a str,
    right: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    if let Ok(entry) = serde_json::from_str::<ChangeEntry>(input.history_line) {
        let _ = format_entry(&entry);
    }
    if let Ok(snapshot) = serde_json::from_str::<UndoSnapshot>(input.undo_file) {
        let _ = snapshot.current();
    }
    let _ = parse_target_time(input.target_time);

    let left = serde_json::from_str(input.left).ok().and_then(|v| into_preset(v, "left").ok());
    let right = serde_json::from_str(input.right).ok().and_then(|v| into_preset(v, "right").ok());
    if let (Some(a), Some(b)) = (left, right) {
        assert!(diff_presets(&a, &a).is_empty());
        let forward = diff_presets(&a, &b);
        assert_eq!(forward.len(), diff_presets(&b, &a).len());
    }
});
