//! Rule-table coverage for the parameter-apply engine: one case per
//! coercion rule, driven through the public library API against the default
//! node map.

mod common;

use labops::backends::CameraBackend;
use labops::backends::real_sdk::apply_params::apply_params;
use labops::backends::real_sdk::node_map::default_node_map;
use labops::backends::real_sdk::param_key_map::ParamKeyMap;
use labops::scenario::{ApplyMode, BackendKind, ParamRequest};

struct RuleCase {
    name: &'static str,
    key: &'static str,
    value: &'static str,
    expect_supported: bool,
    expect_applied: bool,
    expect_adjusted: bool,
    expect_actual: Option<&'static str>,
    expect_reason_contains: Option<&'static str>,
}

const RULE_TABLE: &[RuleCase] = &[
    RuleCase {
        name: "float within range applies cleanly",
        key: "exposure_us",
        value: "2500",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: false,
        expect_actual: Some("2500"),
        expect_reason_contains: None,
    },
    RuleCase {
        name: "float below minimum clamps up",
        key: "exposure_us",
        value: "1",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: true,
        expect_actual: Some("5"),
        expect_reason_contains: Some("clamped from 1 to 5"),
    },
    RuleCase {
        name: "float above maximum clamps down",
        key: "gain_db",
        value: "99.5",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: true,
        expect_actual: Some("48"),
        expect_reason_contains: Some("allowed range [0, 48]"),
    },
    RuleCase {
        name: "non-numeric float input is unsupported",
        key: "gain_db",
        value: "loud",
        expect_supported: true,
        expect_applied: false,
        expect_adjusted: false,
        expect_actual: None,
        expect_reason_contains: Some("expected floating-point value"),
    },
    RuleCase {
        name: "enum exact casing applies without adjustment",
        key: "pixel_format",
        value: "mono12",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: false,
        expect_actual: Some("mono12"),
        expect_reason_contains: None,
    },
    RuleCase {
        name: "enum casing difference normalizes",
        key: "trigger_mode",
        value: "Hardware",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: true,
        expect_actual: Some("hardware"),
        expect_reason_contains: Some("normalized enumeration value casing"),
    },
    RuleCase {
        name: "enum value outside allowed set is unsupported",
        key: "trigger_source",
        value: "line9",
        expect_supported: true,
        expect_applied: false,
        expect_adjusted: false,
        expect_actual: None,
        expect_reason_contains: Some("not supported"),
    },
    RuleCase {
        name: "free string passes through",
        key: "roi",
        value: "0,0,960,540",
        expect_supported: true,
        expect_applied: true,
        expect_adjusted: false,
        expect_actual: Some("0,0,960,540"),
        expect_reason_contains: None,
    },
    RuleCase {
        name: "unmapped key is unsupported before any node work",
        key: "focus_mode",
        value: "auto",
        expect_supported: false,
        expect_applied: false,
        expect_adjusted: false,
        expect_actual: None,
        expect_reason_contains: Some("no generic->node mapping was found"),
    },
];

fn default_key_map() -> ParamKeyMap {
    ParamKeyMap::from_text(
        r#"{
            "exposure_us": "ExposureTime",
            "gain_db": "Gain",
            "pixel_format": "PixelFormat",
            "roi": "RegionOfInterest",
            "trigger_mode": "TriggerMode",
            "trigger_source": "TriggerSource",
            "fps": "AcquisitionFrameRate"
        }"#,
    )
    .unwrap()
}

#[test]
fn rule_table_cases_hold_in_best_effort_mode() {
    for case in RULE_TABLE {
        let mut backend = CameraBackend::create(BackendKind::Sim);
        backend.connect().unwrap();
        let key_map = default_key_map();
        let mut node_map = default_node_map();

        let report = apply_params(
            &mut backend,
            &key_map,
            &mut node_map,
            &[ParamRequest {
                key: case.key.into(),
                value: case.value.into(),
            }],
            ApplyMode::BestEffort,
        );
        assert!(report.succeeded(), "{}: best effort never fails", case.name);
        assert_eq!(report.readback_rows.len(), 1, "{}", case.name);

        let row = &report.readback_rows[0];
        assert_eq!(row.supported, case.expect_supported, "{}", case.name);
        assert_eq!(row.applied, case.expect_applied, "{}", case.name);
        assert_eq!(row.adjusted, case.expect_adjusted, "{}", case.name);
        assert_eq!(
            row.actual_value.as_deref(),
            case.expect_actual,
            "{}",
            case.name
        );
        match case.expect_reason_contains {
            Some(needle) => assert!(
                row.reason.as_deref().is_some_and(|r| r.contains(needle)),
                "{}: reason {:?} missing {needle:?}",
                case.name,
                row.reason
            ),
            None => assert_eq!(row.reason, None, "{}", case.name),
        }
    }
}

#[test]
fn rule_table_invariants_hold_for_every_case() {
    for case in RULE_TABLE {
        let mut backend = CameraBackend::create(BackendKind::Sim);
        backend.connect().unwrap();
        let key_map = default_key_map();
        let mut node_map = default_node_map();
        let report = apply_params(
            &mut backend,
            &key_map,
            &mut node_map,
            &[ParamRequest {
                key: case.key.into(),
                value: case.value.into(),
            }],
            ApplyMode::BestEffort,
        );
        let row = &report.readback_rows[0];

        if row.applied {
            assert!(row.supported, "{}: applied implies supported", case.name);
        }
        if row.adjusted {
            assert!(row.applied, "{}: adjusted implies applied", case.name);
        }
        assert_eq!(
            row.actual_value.is_some(),
            row.applied,
            "{}: actual present iff readback ran",
            case.name
        );
        if !row.supported || !row.applied || row.adjusted {
            assert!(
                row.reason.as_deref().is_some_and(|r| !r.is_empty()),
                "{}: reason required",
                case.name
            );
        }
    }
}
