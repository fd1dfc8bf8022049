mod accessor;
mod arguments;
mod config;
mod validation_steps;

pub use accessor::{
    AccessTokener, Accessor, ArgOptioner, ArgSchemarer, ConfigValidator, ConfigurableProvider,
    Configurer, GrantValidator, Instructioner, Operationer, ProviderCapabilities, Validator,
};
pub use arguments::{
    ArgDescriptor, ArgGroupDescriptor, ArgGroupOption, ArgOption, ArgOptions, ArgSchema,
};
pub use config::{ConfigField, ConfigLoader, ConfigValues};
pub use validation_steps::{
    ConfigValidationFn, ConfigValidationStep, ConfigValidationSteps, GrantValidationFn,
    GrantValidationStep, GrantValidationSteps,
};
