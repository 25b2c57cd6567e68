// Reference:
//   E. Hairer & G. Wanner, "Solving Ordinary Differential Equations II" (1996), §IV.7
//   Coefficients of the stiffly accurate RODAS4 pair in the transformed
//   (k-scaled) formulation.

//! Rosenbrock method coefficients.
//!
//! Order 4(3), L-stable. Stages `k1..k5` are solved against the same
//! factorized stage matrix; a sixth solve yields the embedded error estimate.

/// Diagonal of the Γ matrix.
pub const GAMMA: f64 = 0.25;

/// Stage abscissae.
pub const C2: f64 = 0.386;
pub const C3: f64 = 0.21;
pub const C4: f64 = 0.63;

/// Row sums of Γ, multiplying the explicit time derivative.
pub const D1: f64 = 0.25;
pub const D2: f64 = -0.1043;
pub const D3: f64 = 0.1035;
pub const D4: f64 = -0.0362;

/// Stage state combinations `y + Σ a_ij k_j`.
pub const A21: f64 = 1.544;
pub const A31: f64 = 0.946_678_528_081_582_6;
pub const A32: f64 = 0.255_701_169_898_328_4;
pub const A41: f64 = 3.314_825_187_068_521;
pub const A42: f64 = 2.896_124_015_972_201;
pub const A43: f64 = 0.998_641_913_997_781_7;
pub const A51: f64 = 1.221_224_509_226_641;
pub const A52: f64 = 6.019_134_481_288_629;
pub const A53: f64 = 12.537_083_329_320_87;
pub const A54: f64 = -0.687_886_036_105_895;

/// Stage coupling terms `Σ c_ij k_j / h`.
pub const C21: f64 = -5.6688;
pub const C31: f64 = -2.430_093_356_833_875;
pub const C32: f64 = -0.206_359_915_709_191_5;
pub const C41: f64 = -0.107_352_905_815_137_5;
pub const C42: f64 = -9.594_562_251_023_355;
pub const C43: f64 = -20.470_286_148_096_16;
pub const C51: f64 = 7.496_443_313_967_647;
pub const C52: f64 = -10.246_804_314_643_52;
pub const C53: f64 = -33.999_903_528_199_05;
pub const C54: f64 = 11.708_908_932_061_6;
pub const C61: f64 = 8.083_246_795_921_522;
pub const C62: f64 = -7.981_132_988_064_893;
pub const C63: f64 = -31.521_594_328_743_71;
pub const C64: f64 = 16.319_305_431_231_36;
pub const C65: f64 = -6.058_818_238_834_054;

/// Error-controller exponent, `1 / (order)`.
pub const ERROR_EXPONENT: f64 = 0.25;
