//! TypeScript Generation Tests
//!
//! Validates that the console's wire-facing types can be exported to
//! TypeScript when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, the types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<round_table::UpdateRate>();
    assert_type::<round_table::ConnectionStatus>();
    assert_type::<round_table::control::FsmDescription>();
    assert_type::<round_table::control::FsmState>();
    assert_type::<round_table::control::FsmTransition>();
    assert_type::<round_table::control::FsmWildcardTransition>();
    assert_type::<round_table::control::HsvRange>();
    assert_type::<round_table::control::BgrColour>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = round_table::UpdateRate::Native;
    let _ = round_table::ConnectionStatus::Connecting;
}
