/*
These are internal models that we define.
*/

use serde::Serialize;

/// One weigh-in. Masses are kilograms, percentages are passed through.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BodyCompositionMeasurement {
    pub date: Option<String>,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub body_fat_percent: Option<f64>,
    pub body_water_percent: Option<f64>,
    pub bone_mass_kg: Option<f64>,
    pub muscle_mass_kg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BodyComposition {
    pub start_date: String,
    pub end_date: String,
    pub measurements: Vec<BodyCompositionMeasurement>,
}
