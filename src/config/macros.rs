/// Define a configuration struct with embedded defaults
///
/// Each field is declared once with its type and default value; the macro
/// generates the struct with public fields, the `Default` impl, and serde
/// support with `#[serde(default)]` so partial TOML files fill in the rest.
///
/// # Example
/// ```ignore
/// config_struct! {
///     pub struct IdempotencyConfig {
///         ttl_secs: u64 = 600,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
