// fs-core/src/units.rs
//
// Flows are plain f64 in kmol/hr and enthalpies in kJ/hr; uom covers the
// state variables exposed at public boundaries.

use uom::si::f64::{
    Pressure as UomPressure, TemperatureInterval as UomTemperatureInterval,
    ThermodynamicTemperature as UomThermodynamicTemperature,
};

pub type Pressure = UomPressure;
pub type TempInterval = UomTemperatureInterval;
pub type Temperature = UomThermodynamicTemperature;

#[inline]
pub fn pa(v: f64) -> Pressure {
    use uom::si::pressure::pascal;
    Pressure::new::<pascal>(v)
}

#[inline]
pub fn k(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::kelvin;
    Temperature::new::<kelvin>(v)
}

#[inline]
pub fn delta_k(v: f64) -> TempInterval {
    use uom::si::temperature_interval::kelvin;
    TempInterval::new::<kelvin>(v)
}

#[inline]
pub fn to_pa(p: Pressure) -> f64 {
    use uom::si::pressure::pascal;
    p.get::<pascal>()
}

#[inline]
pub fn to_k(t: Temperature) -> f64 {
    use uom::si::thermodynamic_temperature::kelvin;
    t.get::<kelvin>()
}

pub mod constants {
    /// Standard atmosphere [Pa].
    pub const P_ATM_PA: f64 = 101_325.0;
    /// Reference temperature for enthalpies [K].
    pub const T_REF_K: f64 = 298.15;
    /// Gas constant [kJ/kmol/K].
    pub const R_KJ_KMOL_K: f64 = 8.314_462_618;
}
