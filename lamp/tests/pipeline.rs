//! End-to-end properties of the render-and-inject pipeline.

use approx::assert_relative_eq;
use float_cmp::approx_eq;
use lamp::{
    param_map, Equatorial, Frame, FrameState, ImageSize, LampError, LensMapping, SourceModel,
    SpectrumInjector, TanWcs, WorldCoordinateSystem,
};
use nalgebra::Matrix2;
use ndarray::Array2;
use test_helpers::{
    blank_exposures, dc2_field, point_source_image, sersic_source, tan_wcs_centered,
    unit_point_source, DC2_DEC_DEG, DC2_RA_DEG,
};

fn centroid(image: &Array2<f64>) -> (f64, f64) {
    let total = image.sum();
    let (mut x, mut y) = (0.0, 0.0);
    for ((r, c), v) in image.indexed_iter() {
        x += c as f64 * v;
        y += r as f64 * v;
    }
    (x / total, y / total)
}

#[test]
fn test_unit_pixel_scenario() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    frame.set_source(unit_point_source(0.05));

    let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
    let exposures = blank_exposures(1, 100);
    let out = frame
        .inject(
            &LensMapping::identity(),
            &[1.0],
            &wcs,
            &dc2_field(),
            &exposures,
            &SpectrumInjector::new(),
        )
        .unwrap();

    assert_eq!(out.len(), 1);
    assert!(approx_eq!(f64, out[0].sum(), 1.0, epsilon = 1e-12));

    let (cx, cy) = centroid(&out[0]);
    assert!((cx - 49.5).abs() < 1.0, "centroid x {cx}");
    assert!((cy - 49.5).abs() < 1.0, "centroid y {cy}");
    let outside: f64 = out[0]
        .indexed_iter()
        .filter(|((r, c), _)| !(48..=51).contains(r) || !(48..=51).contains(c))
        .map(|(_, v)| v.abs())
        .sum();
    assert_eq!(outside, 0.0);
}

#[test]
fn test_flux_conservation_per_band() {
    let source = sersic_source(48, 0.03, 1.5, 0.15, 12.0);
    let mut frame = Frame::new(ImageSize::from_width_height(48, 48), 0.03, 1).unwrap();
    frame.set_source(source);

    let spectrum = [1.0, 0.25, 3.5];
    let wcs = tan_wcs_centered(80, dc2_field(), 0.2);
    let exposures = blank_exposures(3, 80);
    let out = frame
        .inject(
            &LensMapping::identity(),
            &spectrum,
            &wcs,
            &dc2_field(),
            &exposures,
            &SpectrumInjector::new(),
        )
        .unwrap();

    for (band, s) in spectrum.iter().enumerate() {
        assert_relative_eq!(out[band].sum(), 12.0 * s, max_relative = 1e-10);
    }
}

#[test]
fn test_supersampled_flux_conservation_with_edge_light() {
    // Brightest along the patch border
    let image = Array2::from_shape_fn((10, 10), |(r, c)| {
        let edge = r.min(c).min(9 - r).min(9 - c);
        1.0 + 4.0 / (1.0 + edge as f64)
    });
    let total = image.sum();
    let source = SourceModel::from_image(image, Some(0.05), None).unwrap();

    let spectrum = [1.0, 2.0];
    let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
    let exposures = blank_exposures(2, 100);

    for factor in [2, 3, 4] {
        let mut frame = Frame::new(source.size(), 0.05, factor).unwrap();
        frame.set_source(source.clone());

        let lensed = frame.lens_source(&LensMapping::identity()).unwrap();
        assert_relative_eq!(lensed.total_flux(), total, max_relative = 1e-12);

        let out = frame
            .inject(
                &LensMapping::identity(),
                &spectrum,
                &wcs,
                &dc2_field(),
                &exposures,
                &SpectrumInjector::new(),
            )
            .unwrap();
        for (image, s) in out.iter().zip(&spectrum) {
            assert_relative_eq!(image.sum(), total * s, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_rotated_anisotropic_exposure_placement() {
    // +x pixel steps go North by 0.2", +y pixel steps go West by 0.3"
    let arcsec = 1.0 / 3600.0;
    let wcs = TanWcs::new(
        (49.5, 49.5),
        dc2_field(),
        Matrix2::new(0.0, -0.3 * arcsec, 0.2 * arcsec, 0.0),
    )
    .unwrap();

    // Point 0.2" West, then 0.2" North, of the stamp centre
    let cases = [((10, 14), (49.5, 49.5 + 0.2 / 0.3)), ((14, 10), (49.5 + 1.0, 49.5))];
    for ((row, col), (ex, ey)) in cases {
        let source =
            SourceModel::from_image(point_source_image(21, row, col, 1.0), Some(0.05), None)
                .unwrap();
        let mut frame = Frame::new(source.size(), 0.05, 1).unwrap();
        frame.set_source(source);

        let out = frame
            .inject(
                &LensMapping::identity(),
                &[1.0],
                &wcs,
                &dc2_field(),
                &blank_exposures(1, 100),
                &SpectrumInjector::new(),
            )
            .unwrap();

        assert_relative_eq!(out[0].sum(), 1.0, max_relative = 1e-12);
        let (cx, cy) = centroid(&out[0]);
        assert_relative_eq!(cx, ex, epsilon = 1e-4);
        assert_relative_eq!(cy, ey, epsilon = 1e-4);
    }
}

#[test]
fn test_identity_lensing_round_trip() {
    let source = sersic_source(32, 0.04, 2.0, 0.2, 1.0);
    let mut frame = Frame::new(source.size(), source.pixel_scale(), 1).unwrap();
    frame.set_source(source.clone());

    let lensed = frame.lens_source(&LensMapping::identity()).unwrap();
    for (a, b) in lensed.data().iter().zip(source.image().data().iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-15);
    }
}

#[test]
fn test_injection_never_mutates_inputs() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    frame.set_source(unit_point_source(0.05));

    let wcs = tan_wcs_centered(50, dc2_field(), 0.2);
    let exposures = vec![Array2::from_elem((50, 50), 3.0); 2];
    let before = exposures.clone();
    let before_ptrs: Vec<*const f64> = exposures.iter().map(|e| e.as_ptr()).collect();

    let out = frame
        .inject(
            &LensMapping::identity(),
            &[1.0, 2.0],
            &wcs,
            &dc2_field(),
            &exposures,
            &SpectrumInjector::new(),
        )
        .unwrap();

    assert_eq!(exposures, before);
    for (copy, original) in out.iter().zip(&before_ptrs) {
        assert_ne!(copy.as_ptr(), *original);
    }
    assert_ne!(out, before);
}

#[test]
fn test_repeated_lensing_is_bit_identical() {
    let mut frame = Frame::new(ImageSize::from_width_height(40, 40), 0.04, 2).unwrap();
    frame.set_source(sersic_source(40, 0.02, 1.0, 0.1, 1.0));
    let lens = LensMapping::new(
        &["sis", "shear"],
        &[
            param_map(&[("theta_E", 0.5), ("center_x", 0.01)]),
            param_map(&[("gamma1", 0.03), ("gamma2", 0.01)]),
        ],
    )
    .unwrap();

    let first = frame.lens_source(&lens).unwrap().clone();
    let second = frame.lens_source(&lens).unwrap().clone();
    assert_eq!(first, second);

    // A fresh frame with the same inputs renders the same bits
    let mut other = Frame::new(ImageSize::from_width_height(40, 40), 0.04, 2).unwrap();
    other.set_source(sersic_source(40, 0.02, 1.0, 0.1, 1.0));
    assert_eq!(other.lens_source(&lens).unwrap(), &first);
}

#[test]
fn test_off_exposure_injection_adds_nothing() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    frame.set_source(unit_point_source(0.05));

    let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
    let far = Equatorial::from_degrees(DC2_RA_DEG, DC2_DEC_DEG + 0.1);
    assert!(wcs.sky_to_pixel(&far).unwrap().1 > 1000.0);

    let exposures = blank_exposures(2, 100);
    let out = frame
        .inject(
            &LensMapping::identity(),
            &[1.0, 1.0],
            &wcs,
            &far,
            &exposures,
            &SpectrumInjector::new(),
        )
        .unwrap();
    assert_eq!(out, exposures);
}

#[test]
fn test_partial_overlap_is_clipped() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    frame.set_source(unit_point_source(0.05));

    // Corner pixel (0, 0) of the exposure: part of the deposit falls off the edge
    let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
    let corner = wcs.pixel_to_sky(0.0, 0.0);
    let out = frame
        .inject(
            &LensMapping::identity(),
            &[1.0],
            &wcs,
            &corner,
            &blank_exposures(1, 100),
            &SpectrumInjector::new(),
        )
        .unwrap();

    let added = out[0].sum();
    assert!(added > 0.0 && added < 1.0, "added {added}");
}

#[test]
fn test_spectrum_mismatch_fails_before_work() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    frame.set_source(unit_point_source(0.05));

    let wcs = tan_wcs_centered(100, dc2_field(), 0.2);
    let err = frame
        .inject(
            &LensMapping::identity(),
            &[1.0, 1.0],
            &wcs,
            &dc2_field(),
            &blank_exposures(3, 100),
            &SpectrumInjector::new(),
        )
        .unwrap_err();
    assert!(matches!(err, LampError::Configuration(_)));
}

#[test]
fn test_lensing_without_source_is_precondition_error() {
    let mut frame = Frame::new(ImageSize::from_width_height(10, 10), 0.05, 1).unwrap();
    assert_eq!(frame.state(), FrameState::Empty);
    assert!(matches!(
        frame.lens_source(&LensMapping::identity()),
        Err(LampError::Precondition(_))
    ));
}
