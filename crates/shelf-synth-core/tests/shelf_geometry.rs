use shelf_synth_core::prelude::*;

fn spec(x0: f64, y0: f64, x1: f64, y1: f64, is_dummy: bool) -> ShelfLineSpec {
    ShelfLineSpec {
        x_start: x0,
        y_start: y0,
        x_end: x1,
        y_end: y1,
        is_dummy,
    }
}

#[test]
fn line_evaluates_slope_and_intercept() {
    let l = Line::new(Point::new(0.0, 10.0), Point::new(100.0, 30.0), false).unwrap();
    assert!((l.slope() - 0.2).abs() < 1e-12);
    assert!((l.intercept() - 10.0).abs() < 1e-12);
    assert!((l.y_at(50.0) - 20.0).abs() < 1e-9);
    // extrapolates outside the segment
    assert!((l.y_at(200.0) - 50.0).abs() < 1e-9);
}

#[test]
fn line_passes_through_both_endpoints() {
    let pts = [
        ((0.0, 0.0), (640.0, 12.5)),
        ((13.0, 400.0), (1270.0, 371.25)),
        ((900.0, 88.0), (12.0, 101.0)),
        ((-5.0, -5.0), (5.0, 1e4)),
    ];
    for ((x0, y0), (x1, y1)) in pts {
        let l = Line::new(Point::new(x0, y0), Point::new(x1, y1), false).unwrap();
        let tol = 1e-9 * (1.0 + y0.abs().max(y1.abs()));
        assert!((l.y_at(x0) - y0).abs() < tol);
        assert!((l.y_at(x1) - y1).abs() < tol);
    }
}

#[test]
fn vertical_line_is_rejected() {
    let err = Line::new(Point::new(5.0, 0.0), Point::new(5.0, 40.0), false).unwrap_err();
    assert!(matches!(err, SynthError::InvalidGeometry { .. }));
    let err = Shelf::from_lines(&[spec(0.0, 0.0, 10.0, 0.0, false), spec(3.0, 1.0, 3.0, 9.0, false)])
        .unwrap_err();
    assert!(matches!(err, SynthError::InvalidGeometry { .. }));
}

#[test]
fn non_finite_coordinates_are_rejected() {
    assert!(Line::new(Point::new(0.0, f64::NAN), Point::new(10.0, 0.0), false).is_err());
    assert!(Line::new(Point::new(0.0, 0.0), Point::new(f64::INFINITY, 0.0), false).is_err());
}

#[test]
fn region_height_follows_slant() {
    let top = Line::new(Point::new(0.0, 0.0), Point::new(200.0, 20.0), false).unwrap();
    let bottom = Line::new(Point::new(0.0, 100.0), Point::new(200.0, 160.0), false).unwrap();
    let r = ShelfRegion::new(top, bottom);
    assert!((r.height_at(0.0) - 100.0).abs() < 1e-9);
    assert!((r.height_at(200.0) - 140.0).abs() < 1e-9);
    assert!((r.height_at(100.0) - 120.0).abs() < 1e-9);
}

#[test]
fn region_height_is_never_negative() {
    // lines given bottom-first
    let top = Line::new(Point::new(0.0, 100.0), Point::new(50.0, 100.0), false).unwrap();
    let bottom = Line::new(Point::new(0.0, 40.0), Point::new(50.0, 40.0), false).unwrap();
    let r = ShelfRegion::new(top, bottom);
    assert!((r.height_at(25.0) - 60.0).abs() < 1e-9);
}

#[test]
fn region_extent_uses_larger_endpoints() {
    let top = Line::new(Point::new(10.0, 0.0), Point::new(280.0, 0.0), false).unwrap();
    let bottom = Line::new(Point::new(4.0, 90.0), Point::new(300.0, 96.0), false).unwrap();
    let r = ShelfRegion::new(top, bottom);
    assert_eq!(r.x_start(), 10.0);
    assert_eq!(r.x_end(), 300.0);
    assert_eq!(r.y_start(), 0.0);
    assert_eq!(r.y_end(), 96.0);
}

#[test]
fn shelf_pairs_lines_and_filters_dummy_regions() {
    let shelf = Shelf::from_lines(&[
        spec(0.0, 0.0, 300.0, 5.0, false),
        spec(0.0, 100.0, 300.0, 105.0, false),
        spec(0.0, 200.0, 300.0, 210.0, true),
        spec(0.0, 300.0, 300.0, 310.0, false),
    ])
    .unwrap();
    assert_eq!(shelf.all_regions().len(), 3);
    let placeable = shelf.regions();
    assert_eq!(placeable.len(), 2);
    assert!(placeable.iter().all(|r| !r.is_dummy()));
    assert!(shelf.all_regions()[1].is_dummy());
    // region order is top to bottom
    assert!(placeable[0].y_end() < placeable[1].y_end());
}

#[test]
fn fewer_than_two_lines_gives_no_regions() {
    assert!(Shelf::from_lines(&[]).unwrap().all_regions().is_empty());
    assert!(
        Shelf::from_lines(&[spec(0.0, 0.0, 1.0, 0.0, false)])
            .unwrap()
            .regions()
            .is_empty()
    );
}

#[test]
fn line_spec_dummy_flag_defaults_to_false() {
    let s: ShelfLineSpec =
        serde_json::from_str(r#"{"x_start":0,"y_start":1,"x_end":10,"y_end":2}"#).unwrap();
    assert!(!s.is_dummy);
}
