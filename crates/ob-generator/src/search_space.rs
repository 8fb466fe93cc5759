//! Translation of varying parameters into engine range specs.

use ob_engine::{FixedFeatures, ParameterKind, RangeParameterSpec};
use ob_types::{config_error, ObResult, VaryingParameter};

/// Engine-side view of the varying parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedSpace {
    pub parameters: Vec<RangeParameterSpec>,
    pub fixed_features: FixedFeatures,
}

/// Numeric kind of a parameter, from its dtype.
pub fn parameter_kind(parameter: &VaryingParameter) -> ObResult<ParameterKind> {
    match parameter.dtype.kind() {
        'f' => Ok(ParameterKind::Float),
        'i' => Ok(ParameterKind::Int),
        _ => Err(config_error!(
            "range parameter '{}' must be of float or int type, not {}",
            parameter.name,
            parameter.dtype
        )),
    }
}

/// Engine range spec for one parameter. Int parameters must admit at least
/// one integer.
pub fn range_spec(parameter: &VaryingParameter) -> ObResult<RangeParameterSpec> {
    let kind = parameter_kind(parameter)?;
    if kind == ParameterKind::Int && parameter.lower_bound.ceil() > parameter.upper_bound.floor() {
        return Err(config_error!(
            "int parameter '{}' has no integer in [{}, {}]",
            parameter.name,
            parameter.lower_bound,
            parameter.upper_bound
        ));
    }
    Ok(RangeParameterSpec {
        name: parameter.name.clone(),
        kind,
        bounds: [parameter.lower_bound, parameter.upper_bound],
        is_fidelity: parameter.is_fidelity,
        target_value: parameter.fidelity_target_value,
    })
}

/// Values of every fixed parameter.
pub fn fixed_features(parameters: &[VaryingParameter]) -> ObResult<FixedFeatures> {
    parameters
        .iter()
        .filter(|p| p.is_fixed)
        .map(|p| {
            p.default_value
                .map(|v| (p.name.clone(), v))
                .ok_or_else(|| config_error!("fixed parameter '{}' has no value", p.name))
        })
        .collect()
}

pub fn translate(parameters: &[VaryingParameter]) -> ObResult<TranslatedSpace> {
    Ok(TranslatedSpace {
        parameters: parameters.iter().map(range_spec).collect::<ObResult<_>>()?,
        fixed_features: fixed_features(parameters)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_types::{Dtype, ObError};

    fn varying() -> Vec<VaryingParameter> {
        let mut fixed = VaryingParameter::new("x2", -1.0, 1.0).unwrap();
        fixed.fix_value(0.25).unwrap();
        vec![
            VaryingParameter::new("x0", 0.0, 1.0).unwrap(),
            VaryingParameter::new("x1", 1.0, 8.0)
                .unwrap()
                .with_dtype(Dtype::Int64),
            fixed,
            VaryingParameter::new("res", 1.0, 4.0)
                .unwrap()
                .with_dtype(Dtype::Float32)
                .with_fidelity(4.0),
        ]
    }

    #[test]
    fn one_spec_per_parameter() {
        let space = translate(&varying()).unwrap();
        assert_eq!(space.parameters.len(), 4);
        for (spec, param) in space.parameters.iter().zip(varying()) {
            assert_eq!(spec.name, param.name);
            assert_eq!(spec.bounds, [param.lower_bound, param.upper_bound]);
        }
        assert_eq!(space.parameters[0].kind, ParameterKind::Float);
        assert_eq!(space.parameters[1].kind, ParameterKind::Int);
        assert!(space.parameters[3].is_fidelity);
        assert_eq!(space.parameters[3].target_value, Some(4.0));
    }

    #[test]
    fn fixed_parameters_form_the_overlay() {
        let space = translate(&varying()).unwrap();
        assert_eq!(space.fixed_features.len(), 1);
        assert_eq!(space.fixed_features.get("x2"), Some(0.25));
    }

    #[test]
    fn non_numeric_dtypes_are_rejected() {
        for dtype in [Dtype::Bool, Dtype::Str, Dtype::Uint64] {
            let mut params = varying();
            params[1].dtype = dtype;
            match translate(&params) {
                Err(ObError::Config(msg)) => assert!(msg.contains("x1")),
                other => panic!("expected config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn int_range_without_integers_is_rejected() {
        let mut params = varying();
        params[1] = VaryingParameter::new("x1", 1.2, 1.8)
            .unwrap()
            .with_dtype(Dtype::Int64);
        match translate(&params) {
            Err(ObError::Config(msg)) => assert!(msg.contains("x1")),
            other => panic!("expected config error, got {other:?}"),
        }

        // Same bounds are fine as a float.
        params[1].dtype = Dtype::Float64;
        assert!(translate(&params).is_ok());
    }

    #[test]
    fn fixed_without_value_is_rejected() {
        let mut params = varying();
        params[0].is_fixed = true;
        assert!(translate(&params).unwrap_err().is_config());
    }
}
