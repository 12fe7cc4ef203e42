/// Coefficients of an explicit Runge-Kutta scheme.
///
/// `a` must be strictly lower triangular so that stage `s` only depends on
/// stages `0..s`. `b` holds the weights of the solution that is advanced;
/// adaptive methods additionally carry an [`ErrorWeights`] describing how the
/// local error estimate is formed. Tableaus are built once as constants and
/// shared read-only; nothing here is ever mutated.
#[derive(Clone, Copy, Debug)]
pub struct ButcherTableau<const STAGES: usize> {
    pub name: &'static str,
    /// Order of the solution advanced by `b`.
    pub order: usize,
    pub a: [[f64; STAGES]; STAGES],
    pub b: [f64; STAGES],
    pub c: [f64; STAGES],
    pub error: Option<ErrorWeights<STAGES>>,
}

/// How an adaptive tableau forms its local error estimate.
#[derive(Clone, Copy, Debug)]
pub enum ErrorWeights<const STAGES: usize> {
    /// Second weight row of an embedded pair; error = dt * (b - b2) . k
    Embedded { order: usize, b2: [f64; STAGES] },
    /// Dedicated error coefficients; error = dt * e . k
    Direct { order: usize, e: [f64; STAGES] },
}

impl<const STAGES: usize> ButcherTableau<STAGES> {
    pub const fn stages(&self) -> usize {
        STAGES
    }

    /// True iff `a` is strictly lower triangular.
    pub fn is_explicit(&self) -> bool {
        for s in 0..STAGES {
            for i in s..STAGES {
                if self.a[s][i] != 0.0 {
                    return false;
                }
            }
        }
        true
    }

    pub const fn is_adaptive(&self) -> bool {
        self.error.is_some()
    }

    pub const fn embedded_order(&self) -> Option<usize> {
        match self.error {
            Some(ErrorWeights::Embedded { order, .. }) | Some(ErrorWeights::Direct { order, .. }) => {
                Some(order)
            }
            None => None,
        }
    }

    /// "First same as last": the final stage of an accepted step evaluates the
    /// derivative at the step's endpoint with the solution weights, so it is
    /// numerically identical to stage 0 of the next step and can be reused.
    pub fn is_fsal(&self) -> bool {
        self.c[STAGES - 1] == 1.0 && self.a[STAGES - 1] == self.b
    }
}

impl ButcherTableau<1> {
    /// Forward Euler.
    pub const FEULER: Self = Self {
        name: "feuler",
        order: 1,
        a: [[0.]],
        b: [1.],
        c: [0.],
        error: None,
    };
}

impl ButcherTableau<2> {
    /// Explicit midpoint method.
    pub const MIDPOINT: Self = Self {
        name: "midpoint",
        order: 2,
        a: [
            [0., 0.],
            [1. / 2., 0.],
        ],
        b: [0., 1.],
        c: [0., 1. / 2.],
        error: None,
    };

    /// Heun's method (explicit trapezoid).
    pub const HEUN: Self = Self {
        name: "heun",
        order: 2,
        a: [
            [0., 0.],
            [1., 0.],
        ],
        b: [1. / 2., 1. / 2.],
        c: [0., 1.],
        error: None,
    };

    /// Heun-Euler 2(1) embedded pair.
    pub const RK12: Self = Self {
        name: "rk12",
        order: 2,
        a: [
            [0., 0.],
            [1., 0.],
        ],
        b: [1. / 2., 1. / 2.],
        c: [0., 1.],
        error: Some(ErrorWeights::Embedded { order: 1, b2: [1., 0.] }),
    };
}

impl ButcherTableau<4> {
    /// Classical 4th-order Runge-Kutta.
    pub const RK4: Self = Self {
        name: "rk4",
        order: 4,
        a: [
            [0., 0., 0., 0.],
            [1. / 2., 0., 0., 0.],
            [0., 1. / 2., 0., 0.],
            [0., 0., 1., 0.],
        ],
        b: [1. / 6., 1. / 3., 1. / 3., 1. / 6.],
        c: [0., 1. / 2., 1. / 2., 1.],
        error: None,
    };

    /// Bogacki-Shampine 2(3) embedded pair.
    pub const RK23: Self = Self {
        name: "rk23",
        order: 2,
        a: [
            [0., 0., 0., 0.],
            [1. / 2., 0., 0., 0.],
            [0., 3. / 4., 0., 0.],
            [2. / 9., 1. / 3., 4. / 9., 0.],
        ],
        b: [7. / 24., 1. / 4., 1. / 3., 1. / 8.],
        c: [0., 1. / 2., 3. / 4., 1.],
        error: Some(ErrorWeights::Embedded {
            order: 3,
            b2: [2. / 9., 1. / 3., 4. / 9., 0.],
        }),
    };
}

impl ButcherTableau<6> {
    /// Runge-Kutta-Fehlberg 4(5) embedded pair.
    pub const FEHLBERG45: Self = Self {
        name: "fehlberg",
        order: 4,
        a: [
            [0., 0., 0., 0., 0., 0.],
            [1. / 4., 0., 0., 0., 0., 0.],
            [3. / 32., 9. / 32., 0., 0., 0., 0.],
            [1932. / 2197., -7200. / 2197., 7296. / 2197., 0., 0., 0.],
            [439. / 216., -8., 3680. / 513., -845. / 4104., 0., 0.],
            [-8. / 27., 2., -3544. / 2565., 1859. / 4104., -11. / 40., 0.],
        ],
        b: [25. / 216., 0., 1408. / 2565., 2197. / 4104., -1. / 5., 0.],
        c: [0., 1. / 4., 3. / 8., 12. / 13., 1., 1. / 2.],
        error: Some(ErrorWeights::Embedded {
            order: 5,
            b2: [16. / 135., 0., 6656. / 12825., 28561. / 56430., -9. / 50., 2. / 55.],
        }),
    };
}

impl ButcherTableau<7> {
    /// Dormand-Prince 5(4) embedded pair. FSAL: the last stage doubles as
    /// stage 0 of the next step.
    pub const DOPRI45: Self = Self {
        name: "dopri",
        order: 5,
        a: [
            [0., 0., 0., 0., 0., 0., 0.],
            [1. / 5., 0., 0., 0., 0., 0., 0.],
            [3. / 40., 9. / 40., 0., 0., 0., 0., 0.],
            [44. / 45., -56. / 15., 32. / 9., 0., 0., 0., 0.],
            [
                19372. / 6561.,
                -25360. / 2187.,
                64448. / 6561.,
                -212. / 729.,
                0.,
                0.,
                0.,
            ],
            [
                9017. / 3168.,
                -355. / 33.,
                46732. / 5247.,
                49. / 176.,
                -5103. / 18656.,
                0.,
                0.,
            ],
            [
                35. / 384.,
                0.,
                500. / 1113.,
                125. / 192.,
                -2187. / 6784.,
                11. / 84.,
                0.,
            ],
        ],
        b: [
            35. / 384.,
            0.,
            500. / 1113.,
            125. / 192.,
            -2187. / 6784.,
            11. / 84.,
            0.,
        ],
        c: [0., 1. / 5., 3. / 10., 4. / 5., 8. / 9., 1., 1.],
        error: Some(ErrorWeights::Embedded {
            order: 4,
            b2: [
                5179. / 57600.,
                0.,
                7571. / 16695.,
                393. / 640.,
                -92097. / 339200.,
                187. / 2100.,
                1. / 40.,
            ],
        }),
    };
}
