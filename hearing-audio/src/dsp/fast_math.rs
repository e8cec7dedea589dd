//! Fast decibel conversion for the compressor.
//!
//! `to_db` and `from_db` run once per sample per compression stage, so they
//! avoid `logf`/`powf`. Both split the IEEE 754 value into an exponent (exact)
//! and a narrow-range remainder that is approximated:
//!
//! - `to_db`: mantissa `m ∈ [√½, √2)`, approximate `log2(m)`
//! - `from_db`: fraction `f ∈ [-½, ½)`, approximate `2^f`
//!
//! # Approximations
//!
//! | [`Approximation`] | `log2` abs. error | `2^f` rel. error | Worst dB error |
//! |-------------------|-------------------|------------------|----------------|
//! | `Polynomial` (cubic) | 8.3e-4 | 1.0e-4 | 0.005 dB |
//! | `Rational` | 3.0e-6 | 6.7e-4 | 0.006 dB |
//! | `LookupTable` (128 entries, linear) | 1.1e-5 | 3.7e-6 | < 0.001 dB |
//!
//! The pipeline uses [`Approximation::DEFAULT`]; the others are selectable
//! through the same functions for targets where a table in flash is too
//! expensive.
//!
//! # Saturation
//!
//! Magnitudes below [`MIN_MAGNITUDE`] (including zero, negatives and NaN) map
//! to the scale's floor (-380 / -760 dB); levels below the floor map back to
//! [`MIN_MAGNITUDE`] and levels above the ceiling to [`MAX_MAGNITUDE`]. No
//! input produces NaN or infinity.

use libm::{floorf, frexpf, ldexpf};

/// Smallest magnitude distinguished from silence.
pub const MIN_MAGNITUDE: f32 = 1e-38;

/// Largest magnitude produced by [`from_db`].
pub const MAX_MAGNITUDE: f32 = 1e38;

const SQRT_HALF: f32 = core::f32::consts::FRAC_1_SQRT_2;
const LOG2_E: f32 = core::f32::consts::LOG2_E;

/// Which decibel definition a level uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbScale {
    /// `10·log10(x)`, saturating at ±380 dB.
    Power,
    /// `20·log10(x)`, saturating at ±760 dB.
    Amplitude,
}

impl DbScale {
    /// Decibels per doubling of `x`.
    #[inline]
    pub const fn db_per_octave(self) -> f32 {
        match self {
            DbScale::Power => 3.010_299_9,
            DbScale::Amplitude => 6.020_599_9,
        }
    }

    /// Magnitude of the floor and ceiling in dB.
    #[inline]
    pub const fn limit_db(self) -> f32 {
        match self {
            DbScale::Power => 380.0,
            DbScale::Amplitude => 760.0,
        }
    }
}

/// Strategy used for the narrow-range `log2` and `2^f` kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approximation {
    /// Cubic minimax polynomials.
    Polynomial,
    /// Rational polynomial ratios.
    Rational,
    /// 128-entry tables with linear interpolation.
    LookupTable,
}

impl Default for Approximation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Approximation {
    /// Strategy used by the compressor.
    pub const DEFAULT: Self = Approximation::LookupTable;

    /// Every strategy, for tests and benchmarks.
    pub const ALL: [Self; 3] = [
        Approximation::Polynomial,
        Approximation::Rational,
        Approximation::LookupTable,
    ];

    /// `log2(m)` for `m ∈ [√½, √2)`.
    #[inline]
    pub fn log2_mantissa(self, m: f32) -> f32 {
        match self {
            Approximation::Polynomial => {
                // Chebyshev-node fit in (m - 1), max error 8.3e-4
                let x = m - 1.0;
                ((0.431_901_63 * x - 0.757_904_9) * x + 1.446_911_6) * x + 0.000_486_099_5
            }
            Approximation::Rational => {
                let z = (m - 1.0) / (m + 1.0);
                let z2 = z * z;
                let p = (74.201_1 * z2 - 134.730_4) * z2 + 75.151_856;
                let q = (56.215_534 * z2 - 79.890_51) * z2 + 37.575_928;
                z * p / q * LOG2_E
            }
            Approximation::LookupTable => {
                interpolate(&LOG2_TABLE, (m - SQRT_HALF) * LOG2_TABLE_SCALE)
            }
        }
    }

    /// `2^f` for `f ∈ [-½, ½)`.
    #[inline]
    pub fn exp2_fraction(self, f: f32) -> f32 {
        match self {
            Approximation::Polynomial => {
                // Chebyshev-node fit, max relative error 1.0e-4
                ((0.055_838_283 * f + 0.242_639_48) * f + 0.693_136_7) * f + 0.999_924_56
            }
            Approximation::Rational => {
                // Symmetric ratio: 2^-x = 1 / 2^x.
                let x = libm::fabsf(f);
                let p = ((-989.027_85 * x - 11_240.029) * x - 72_102.26) * x - 206_059.51;
                let q = ((-14.516_971 * x - 10_763.509) * x + 70_727.31) * x - 206_059.51;
                if f < 0.0 {
                    q / p
                } else {
                    p / q
                }
            }
            Approximation::LookupTable => interpolate(&EXP2_TABLE, (f + 0.5) * 127.0),
        }
    }
}

/// Linear interpolation into a 128-entry table at fractional index `y`.
#[inline]
fn interpolate(table: &[f32; 128], y: f32) -> f32 {
    let y = y.clamp(0.0, 127.0);
    let i = (y as usize).min(126);
    let frac = y - i as f32;
    table[i] + (table[i + 1] - table[i]) * frac
}

/// Convert a magnitude to decibels.
pub fn to_db(x: f32, scale: DbScale, approx: Approximation) -> f32 {
    // Written so NaN fails the first test.
    if !(x >= MIN_MAGNITUDE) {
        return -scale.limit_db();
    }
    if x > MAX_MAGNITUDE {
        return scale.limit_db();
    }
    let (mut m, mut e) = frexpf(x);
    if m < SQRT_HALF {
        m *= 2.0;
        e -= 1;
    }
    scale.db_per_octave() * (approx.log2_mantissa(m) + e as f32)
}

/// Convert decibels back to a magnitude.
pub fn from_db(db: f32, scale: DbScale, approx: Approximation) -> f32 {
    if !(db >= -scale.limit_db()) {
        return MIN_MAGNITUDE;
    }
    if db > scale.limit_db() {
        return MAX_MAGNITUDE;
    }
    let x = db / scale.db_per_octave();
    let e = floorf(x + 0.5);
    let f = x - e;
    ldexpf(approx.exp2_fraction(f), e as i32).clamp(MIN_MAGNITUDE, MAX_MAGNITUDE)
}

/// `20·log10(x)` with the default approximation.
#[inline]
pub fn amplitude_to_db(x: f32) -> f32 {
    to_db(x, DbScale::Amplitude, Approximation::DEFAULT)
}

/// `10^(db/20)` with the default approximation.
#[inline]
pub fn db_to_amplitude(db: f32) -> f32 {
    from_db(db, DbScale::Amplitude, Approximation::DEFAULT)
}

/// `10·log10(x)` with the default approximation.
#[inline]
pub fn power_to_db(x: f32) -> f32 {
    to_db(x, DbScale::Power, Approximation::DEFAULT)
}

/// `10^(db/10)` with the default approximation.
#[inline]
pub fn db_to_power(db: f32) -> f32 {
    from_db(db, DbScale::Power, Approximation::DEFAULT)
}

/// Entries per unit of mantissa: `127 / (√2 - √½)`.
const LOG2_TABLE_SCALE: f32 = 179.605_12;

/// `log2(x)` at 128 evenly spaced points of `[√½, √2]`.
#[rustfmt::skip]
static LOG2_TABLE: [f32; 128] = [
    -5.000000000e-01, -4.886846868e-01, -4.774574313e-01, -4.663168737e-01,
    -4.552616852e-01, -4.442905674e-01, -4.334022513e-01, -4.225954963e-01,
    -4.118690897e-01, -4.012218455e-01, -3.906526038e-01, -3.801602300e-01,
    -3.697436140e-01, -3.594016698e-01, -3.491333344e-01, -3.389375673e-01,
    -3.288133500e-01, -3.187596853e-01, -3.087755968e-01, -2.988601279e-01,
    -2.890123419e-01, -2.792313211e-01, -2.695161663e-01, -2.598659963e-01,
    -2.502799474e-01, -2.407571733e-01, -2.312968441e-01, -2.218981461e-01,
    -2.125602815e-01, -2.032824679e-01, -1.940639379e-01, -1.849039386e-01,
    -1.758017315e-01, -1.667565919e-01, -1.577678087e-01, -1.488346839e-01,
    -1.399565325e-01, -1.311326822e-01, -1.223624725e-01, -1.136452554e-01,
    -1.049803943e-01, -9.636726399e-02, -8.780525049e-02, -7.929375063e-02,
    -7.083217189e-02, -6.241993207e-02, -5.405645914e-02, -4.574119092e-02,
    -3.747357494e-02, -2.925306813e-02, -2.107913669e-02, -1.295125581e-02,
    -4.868909508e-03, 3.168409558e-03, 1.116120031e-02, 1.910995343e-02,
    2.701515151e-02, 3.487726928e-02, 4.269677374e-02, 5.047412434e-02,
    5.820977312e-02, 6.590416491e-02, 7.355773745e-02, 8.117092156e-02,
    8.874414126e-02, 9.627781395e-02, 1.037723505e-01, 1.112281554e-01,
    1.186456270e-01, 1.260251573e-01, 1.333671327e-01, 1.406719333e-01,
    1.479399338e-01, 1.551715030e-01, 1.623670044e-01, 1.695267960e-01,
    1.766512304e-01, 1.837406552e-01, 1.907954127e-01, 1.978158404e-01,
    2.048022707e-01, 2.117550314e-01, 2.186744453e-01, 2.255608309e-01,
    2.324145019e-01, 2.392357678e-01, 2.460249335e-01, 2.527822996e-01,
    2.595081628e-01, 2.662028154e-01, 2.728665457e-01, 2.794996380e-01,
    2.861023728e-01, 2.926750268e-01, 2.992178726e-01, 3.057311796e-01,
    3.122152131e-01, 3.186702353e-01, 3.250965044e-01, 3.314942756e-01,
    3.378638005e-01, 3.442053274e-01, 3.505191013e-01, 3.568053642e-01,
    3.630643546e-01, 3.692963084e-01, 3.755014579e-01, 3.816800328e-01,
    3.878322598e-01, 3.939583626e-01, 4.000585621e-01, 4.061330765e-01,
    4.121821212e-01, 4.182059088e-01, 4.242046495e-01, 4.301785505e-01,
    4.361278168e-01, 4.420526508e-01, 4.479532522e-01, 4.538298186e-01,
    4.596825448e-01, 4.655116236e-01, 4.713172453e-01, 4.770995979e-01,
    4.828588672e-01, 4.885952367e-01, 4.943088879e-01, 5.000000000e-01,
];

/// `2^x` at 128 evenly spaced points of `[-½, ½]`.
#[rustfmt::skip]
static EXP2_TABLE: [f32; 128] = [
    7.071067812e-01, 7.109766161e-01, 7.148676297e-01, 7.187799380e-01,
    7.227136575e-01, 7.266689053e-01, 7.306457993e-01, 7.346444579e-01,
    7.386650003e-01, 7.427075461e-01, 7.467722160e-01, 7.508591308e-01,
    7.549684124e-01, 7.591001832e-01, 7.632545662e-01, 7.674316852e-01,
    7.716316646e-01, 7.758546295e-01, 7.801007058e-01, 7.843700199e-01,
    7.886626990e-01, 7.929788709e-01, 7.973186643e-01, 8.016822084e-01,
    8.060696332e-01, 8.104810693e-01, 8.149166482e-01, 8.193765021e-01,
    8.238607637e-01, 8.283695667e-01, 8.329030453e-01, 8.374613346e-01,
    8.420445704e-01, 8.466528892e-01, 8.512864283e-01, 8.559453257e-01,
    8.606297202e-01, 8.653397513e-01, 8.700755593e-01, 8.748372854e-01,
    8.796250713e-01, 8.844390596e-01, 8.892793939e-01, 8.941462181e-01,
    8.990396774e-01, 9.039599175e-01, 9.089070850e-01, 9.138813272e-01,
    9.188827922e-01, 9.239116292e-01, 9.289679878e-01, 9.340520188e-01,
    9.391638735e-01, 9.443037042e-01, 9.494716640e-01, 9.546679069e-01,
    9.598925877e-01, 9.651458619e-01, 9.704278862e-01, 9.757388177e-01,
    9.810788148e-01, 9.864480365e-01, 9.918466427e-01, 9.972747942e-01,
    1.002732653e+00, 1.008220381e+00, 1.013738142e+00, 1.019286101e+00,
    1.024864423e+00, 1.030473273e+00, 1.036112819e+00, 1.041783230e+00,
    1.047484673e+00, 1.053217319e+00, 1.058981338e+00, 1.064776902e+00,
    1.070604185e+00, 1.076463358e+00, 1.082354598e+00, 1.088278079e+00,
    1.094233978e+00, 1.100222472e+00, 1.106243740e+00, 1.112297961e+00,
    1.118385315e+00, 1.124505984e+00, 1.130660150e+00, 1.136847997e+00,
    1.143069708e+00, 1.149325469e+00, 1.155615466e+00, 1.161939887e+00,
    1.168298920e+00, 1.174692755e+00, 1.181121582e+00, 1.187585592e+00,
    1.194084979e+00, 1.200619935e+00, 1.207190655e+00, 1.213797336e+00,
    1.220440173e+00, 1.227119365e+00, 1.233835111e+00, 1.240587610e+00,
    1.247377065e+00, 1.254203676e+00, 1.261067648e+00, 1.267969185e+00,
    1.274908493e+00, 1.281885778e+00, 1.288901248e+00, 1.295955112e+00,
    1.303047580e+00, 1.310178863e+00, 1.317349175e+00, 1.324558728e+00,
    1.331807737e+00, 1.339096419e+00, 1.346424989e+00, 1.353793668e+00,
    1.361202673e+00, 1.368652227e+00, 1.376142550e+00, 1.383673865e+00,
    1.391246398e+00, 1.398860374e+00, 1.406516019e+00, 1.414213562e+00,
];
