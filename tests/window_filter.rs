mod support;

use spoutcap_capture::window_filter::{Rejection, TargetFilter, TargetFilterSettings};

use support::{handle, MockWindows};

fn windows() -> MockWindows {
    let windows = MockWindows::default();
    windows.add(1, "SpoutCapHostWindow", "SpoutCap", (640, 360));
    windows.add(2, "Notepad", "Notes", (800, 600));
    windows.add(3, "ConsoleWindowClass", "cmd.exe", (800, 600));
    windows
}

#[test]
fn ordinary_window_passes() {
    let filter = TargetFilter::new(TargetFilterSettings::default(), Some(handle(1)));
    assert_eq!(filter.check(Some(handle(2)), &windows()), Ok(handle(2)));
}

#[test]
fn no_selection_is_reported_as_such() {
    let filter = TargetFilter::default();
    assert_eq!(filter.check(None, &windows()), Err(Rejection::NoTarget));
}

#[test]
fn own_window_is_never_a_target() {
    let filter = TargetFilter::new(TargetFilterSettings::default(), Some(handle(1)));
    assert_eq!(filter.check(Some(handle(1)), &windows()), Err(Rejection::OwnWindow));
}

#[test]
fn console_class_is_excluded() {
    let filter = TargetFilter::new(TargetFilterSettings::default(), None);
    assert_eq!(
        filter.check(Some(handle(3)), &windows()),
        Err(Rejection::ExcludedClass("ConsoleWindowClass".to_string()))
    );
}

#[test]
fn closed_window_reports_liveness_first() {
    let filter = TargetFilter::new(TargetFilterSettings::default(), None);
    let windows = windows();
    windows.close(3);
    assert_eq!(filter.check(Some(handle(3)), &windows), Err(Rejection::NotAlive));
}

#[test]
fn configured_classes_extend_the_exclusion_list() {
    let mut settings = TargetFilterSettings::default();
    settings.exclude_class("notepad");
    let filter = TargetFilter::new(settings, None);

    assert!(matches!(
        filter.check(Some(handle(2)), &windows()),
        Err(Rejection::ExcludedClass(_))
    ));
}

#[test]
fn settings_deserialize_with_default_exclusions() {
    let settings: TargetFilterSettings = serde_json::from_str("{}").unwrap();
    assert!(settings.is_excluded_class("ConsoleWindowClass"));
}
