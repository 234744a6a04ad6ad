//! Rotating vector model fits to simulated linear polarization.

use approx::assert_relative_eq;
use psrmeal::error::ErrorKind;
use psrmeal::fit::{ComplexRvmFit, LinearPolarization, PhaseWindow};
use psrmeal::parameters::Estimate;

use crate::test_helpers::{init_logging, phases_deg, rvm_stokes};

const ALPHA: f64 = 60.0;
const ZETA: f64 = 70.0;

fn simulated(variance: f64) -> Vec<LinearPolarization> {
    let phases = phases_deg(-45.0, 45.0, 32);
    rvm_stokes(0.0, ZETA.to_radians(), ALPHA.to_radians(), 0.0, &phases, variance)
        .into_iter()
        .map(|(phase, q, u)| LinearPolarization::new(phase, q, u))
        .collect()
}

#[test]
fn test_geometry_recovered() {
    init_logging();
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    fit.set_magnetic_axis(Estimate::exact(59f64.to_radians())).unwrap();
    fit.solve().unwrap();

    assert_eq!(fit.nselected().unwrap(), 32);
    assert!(fit.get_chisq() < 1e-3, "chisq {}", fit.get_chisq());
    assert_relative_eq!(fit.get_magnetic_axis().unwrap().value, ALPHA.to_radians(), epsilon = 1e-4);
    assert_relative_eq!(fit.get_line_of_sight().unwrap().value, ZETA.to_radians(), epsilon = 1e-4);
    assert_relative_eq!(fit.get_magnetic_meridian().unwrap().value, 0.0, epsilon = 1e-4);
    assert_relative_eq!(fit.get_reference_position_angle().unwrap().value, 0.0, epsilon = 1e-4);
    // 32 complex constraints, 32 gains and 4 angles
    assert_eq!(fit.get_nfree(), 64 - 36);
    assert!(fit.covariance().is_some());
}

#[test]
fn test_zeta_guess_disabled() {
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    fit.set_magnetic_axis(Estimate::exact(ALPHA.to_radians())).unwrap();
    fit.set_line_of_sight(Estimate::exact(ZETA.to_radians())).unwrap();
    fit.set_guess_zeta(false);
    fit.solve().unwrap();
    assert_relative_eq!(fit.get_line_of_sight().unwrap().value, ZETA.to_radians(), epsilon = 1e-4);
}

#[test]
fn test_orthogonal_mode_window() {
    let window = PhaseWindow::new((-20f64).to_radians(), (-10f64).to_radians());
    let data: Vec<LinearPolarization> = simulated(1e-6)
        .into_iter()
        .map(|mut datum| {
            if window.contains(datum.phase) {
                datum.q.value = -datum.q.value;
                datum.u.value = -datum.u.value;
            }
            datum
        })
        .collect();

    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(data);
    fit.add_orthogonal_mode(window);
    fit.set_magnetic_axis(Estimate::exact(59f64.to_radians())).unwrap();
    fit.solve().unwrap();

    assert!(fit.get_chisq() < 1e-3);
    assert_relative_eq!(fit.get_magnetic_axis().unwrap().value, ALPHA.to_radians(), epsilon = 1e-4);
}

#[test]
fn test_low_significance_excluded() {
    let mut data = simulated(1e-6);
    for k in 0..4 {
        let phase = (60.0 + 5.0 * k as f64).to_radians();
        data.push(LinearPolarization::new(
            phase,
            Estimate::new(0.1, 1.0),
            Estimate::new(-0.1, 1.0),
        ));
    }

    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(data);
    assert_eq!(fit.nselected().unwrap(), 32);

    fit.set_threshold(0.0);
    assert_eq!(fit.nselected().unwrap(), 36);
}

#[test]
fn test_include_window_restricts_selection() {
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    fit.add_include(PhaseWindow::new(0.0, std::f64::consts::PI));
    assert_eq!(fit.nselected().unwrap(), 16);
}

#[test]
fn test_one_dimensional_search() {
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    fit.search_1d(8).unwrap();

    assert!(fit.get_chisq() < 1e-2, "chisq {}", fit.get_chisq());
    assert_relative_eq!(fit.get_magnetic_axis().unwrap().value, ALPHA.to_radians(), epsilon = 1e-2);
    assert!(fit.chisq_map().is_none());
}

#[test]
fn test_two_dimensional_search_map() {
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    fit.set_chisq_map(true);
    fit.search_2d(3, 3).unwrap();

    let map = fit.chisq_map().unwrap();
    assert_eq!(map.dim(), (3, 3));
    let minimum = map
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(f64::INFINITY, f64::min);
    assert_eq!(fit.get_chisq(), minimum);
    // alpha = 0 leaves the angles unconstrained
    assert!(map.row(0).iter().all(|x| x.is_nan()));
}

#[test]
fn test_empty_search_rejected() {
    let mut fit = ComplexRvmFit::new().unwrap();
    fit.set_observations(simulated(1e-6));
    let err = fit.search_1d(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
}
