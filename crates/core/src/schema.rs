//! Tool schema derivation.
//!
//! A tool declares its parameters as typed [`Param`]s. The JSON-Schema shaped
//! [`ToolSchema`] sent to the model is derived from those declarations the
//! first time it is requested and cached for the lifetime of the tool.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::ToolError;

/// Maximum length of a tool name accepted by providers.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// The JSON Schema primitive vocabulary used in tool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    /// Map a Rust type name (last path segment, no generics) to a JSON type.
    /// Unknown types fall back to `string`.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "String" | "str" | "char" | "Cow" => Self::String,
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => Self::Integer,
            "f32" | "f64" => Self::Number,
            "bool" => Self::Boolean,
            "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => Self::Array,
            "HashMap" | "BTreeMap" | "Map" => Self::Object,
            _ => Self::String,
        }
    }

    fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            _ => Self::String,
        }
    }
}

/// The declared type of a tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Null,
    /// A homogeneous list of the element type.
    Array(Box<ParamType>),
    /// The type or nothing.
    Optional(Box<ParamType>),
    /// Any of the alternatives. Resolves to the first non-null one.
    Union(Vec<ParamType>),
    /// One of a fixed set of values.
    Literal(Vec<Value>),
    /// A type known only by name, resolved through [`JsonType::from_type_name`].
    Named(String),
}

impl ParamType {
    /// Derive a parameter type from a Rust type.
    ///
    /// Understands `Option<T>`, sequence and map containers, primitives and
    /// strings. Anything else resolves by name.
    pub fn of<T: ?Sized>() -> Self {
        Self::parse_type_name(std::any::type_name::<T>())
    }

    /// A literal of string values.
    pub fn literal<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Literal(values.into_iter().map(Into::into).collect())
    }

    pub fn array_of(item: ParamType) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn optional(inner: ParamType) -> Self {
        Self::Optional(Box::new(inner))
    }

    fn parse_type_name(raw: &str) -> Self {
        let name = raw.trim().trim_start_matches('&').trim();

        if let Some(inner) = name.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Self::array_of(Self::parse_type_name(inner));
        }

        let (outer, generic) = match (name.find('<'), name.rfind('>')) {
            (Some(open), Some(close)) if close > open => (&name[..open], Some(&name[open + 1..close])),
            _ => (name, None),
        };
        let base = outer.rsplit("::").next().unwrap_or(outer);

        match (base, generic) {
            ("Option", Some(inner)) => Self::optional(Self::parse_type_name(inner)),
            ("Vec" | "VecDeque" | "HashSet" | "BTreeSet", Some(inner)) => {
                Self::array_of(Self::parse_type_name(inner))
            }
            ("HashMap" | "BTreeMap", _) => Self::Object,
            _ => match JsonType::from_type_name(base) {
                JsonType::String if base != "String" && base != "str" => Self::Named(base.to_string()),
                JsonType::String => Self::String,
                JsonType::Integer => Self::Integer,
                JsonType::Number => Self::Number,
                JsonType::Boolean => Self::Boolean,
                JsonType::Array => Self::array_of(Self::String),
                JsonType::Object => Self::Object,
            },
        }
    }

    /// Strip optional/union wrappers down to the first non-null alternative.
    pub fn resolve(&self) -> &ParamType {
        static FALLBACK: ParamType = ParamType::String;
        match self {
            Self::Optional(inner) => inner.resolve(),
            Self::Union(alternatives) => alternatives
                .iter()
                .find(|t| !matches!(t, Self::Null))
                .map(ParamType::resolve)
                .unwrap_or(&FALLBACK),
            other => other,
        }
    }

    pub fn json_type(&self) -> JsonType {
        match self.resolve() {
            Self::String | Self::Null => JsonType::String,
            Self::Integer => JsonType::Integer,
            Self::Number => JsonType::Number,
            Self::Boolean => JsonType::Boolean,
            Self::Object => JsonType::Object,
            Self::Array(_) => JsonType::Array,
            Self::Literal(values) => values.first().map(JsonType::of_value).unwrap_or(JsonType::String),
            Self::Named(name) => JsonType::from_type_name(name),
            Self::Optional(_) | Self::Union(_) => JsonType::String,
        }
    }

    fn enum_values(&self) -> Option<Vec<Value>> {
        match self.resolve() {
            Self::Literal(values) => Some(values.clone()),
            _ => None,
        }
    }

    fn items(&self) -> Option<ItemsSchema> {
        match self.resolve() {
            Self::Array(item) => Some(ItemsSchema {
                r#type: item.json_type(),
            }),
            _ => None,
        }
    }
}

/// Explicit per-parameter description. Overrides derived values and adds
/// bounds, formats, examples and defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Property {
    pub description: Option<String>,
    pub enums: Option<Vec<Value>>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    pub default: Option<Value>,
    pub examples: Option<Vec<Value>>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: Option<bool>,
    pub extra: serde_json::Map<String, Value>,
}

impl Property {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn enums<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enums = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn minimum(mut self, min: impl Into<Value>) -> Self {
        self.minimum = Some(min.into());
        self
    }

    pub fn maximum(mut self, max: impl Into<Value>) -> Self {
        self.maximum = Some(max.into());
        self
    }

    pub fn length(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn examples<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.examples = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn items_bounds(mut self, min: Option<u64>, max: Option<u64>, unique: Option<bool>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self.unique_items = unique;
        self
    }

    /// Any additional JSON Schema keyword.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A declared tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    pub property: Option<Property>,
    /// Default used when the model omits the argument. A parameter is
    /// required iff it has no default.
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            property: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            property: None,
            default: Some(default.into()),
        }
    }

    pub fn with(mut self, property: Property) -> Self {
        self.property = Some(property);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn to_property_schema(&self) -> PropertySchema {
        let prop = self.property.clone().unwrap_or_default();
        PropertySchema {
            r#type: self.ty.json_type(),
            description: prop.description,
            r#enum: prop.enums.or_else(|| self.ty.enum_values()),
            items: self.ty.items(),
            minimum: prop.minimum,
            maximum: prop.maximum,
            min_length: prop.min_length,
            max_length: prop.max_length,
            pattern: prop.pattern,
            format: prop.format,
            default: prop.default.or_else(|| self.default.clone().filter(|v| !v.is_null())),
            examples: prop.examples,
            min_items: prop.min_items,
            max_items: prop.max_items,
            unique_items: prop.unique_items,
            extra: prop.extra,
        }
    }
}

/// Schema of an array's elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsSchema {
    pub r#type: JsonType,
}

/// The JSON Schema of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    pub r#type: JsonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemsSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Always "object".
    pub r#type: JsonType,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterSchema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Function,
}

/// The provider-agnostic description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub r#type: ToolKind,
    pub function: FunctionSchema,
}

impl ToolSchema {
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Name, description and parameter declarations of a tool.
///
/// Built once per tool instance; the derived [`ToolSchema`] is computed on
/// first access and then reused.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    params: Vec<Param>,
    schema: OnceLock<ToolSchema>,
}

impl ToolSpec {
    pub fn builder(description: impl Into<String>) -> ToolSpecBuilder {
        ToolSpecBuilder {
            name: None,
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn schema(&self) -> &ToolSchema {
        self.schema.get_or_init(|| self.derive_schema())
    }

    /// The schema as a JSON value, nulls omitted.
    pub fn schema_value(&self) -> Value {
        serde_json::to_value(self.schema()).unwrap_or(Value::Null)
    }

    fn derive_schema(&self) -> ToolSchema {
        let properties: BTreeMap<String, PropertySchema> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.to_property_schema()))
            .collect();
        let required = self
            .params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.clone())
            .collect();

        ToolSchema {
            r#type: ToolKind::Function,
            function: FunctionSchema {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: (!properties.is_empty()).then_some(ParameterSchema {
                    r#type: JsonType::Object,
                    properties,
                    required,
                }),
            },
        }
    }
}

pub struct ToolSpecBuilder {
    name: Option<String>,
    description: String,
    params: Vec<Param>,
}

impl ToolSpecBuilder {
    /// Declare the tool name explicitly instead of deriving it.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Build with an explicit name.
    pub fn build(self) -> Result<ToolSpec, ToolError> {
        let name = self
            .name
            .clone()
            .ok_or_else(|| ToolError::InvalidSpec("tool name is required".into()))?;
        self.finish(name)
    }

    /// Build, deriving the name from `T` unless one was set explicitly.
    pub fn build_for<T: ?Sized>(self) -> Result<ToolSpec, ToolError> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| snake_case(short_type_name::<T>()));
        self.finish(name)
    }

    fn finish(self, name: String) -> Result<ToolSpec, ToolError> {
        validate_tool_name(&name)?;
        if self.description.trim().is_empty() {
            return Err(ToolError::InvalidSpec(format!("tool {name} has no description")));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.params {
            if !seen.insert(p.name.as_str()) {
                return Err(ToolError::InvalidSpec(format!(
                    "tool {name} declares parameter {} twice",
                    p.name
                )));
            }
        }
        Ok(ToolSpec {
            name,
            description: self.description,
            params: self.params,
            schema: OnceLock::new(),
        })
    }
}

/// Check a tool name against provider constraints.
pub fn validate_tool_name(name: &str) -> Result<(), ToolError> {
    if name.is_empty() || name.len() > MAX_TOOL_NAME_LEN {
        return Err(ToolError::InvalidSpec(format!(
            "tool name must be 1-{MAX_TOOL_NAME_LEN} characters, got {:?}",
            name
        )));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(ToolError::InvalidSpec(format!(
            "tool name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// The last path segment of a type's name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Convert a camel or Pascal case identifier to snake_case.
///
/// An underscore goes between a lowercase letter or digit and an uppercase
/// letter, and between a run of uppercase letters and a following
/// uppercase+lowercase pair. Spaces and dashes become underscores.
pub fn snake_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_acronym = prev.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase());
            if after_lower || ends_acronym {
                out.push('_');
            }
        }
        match c {
            ' ' | '-' => out.push('_'),
            _ => out.push(c.to_ascii_lowercase()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct GetWeather;
    struct HTTPRequestTool;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(snake_case("GetWeather"), "get_weather");
        assert_eq!(snake_case("HTTPRequest"), "http_request");
        assert_eq!(snake_case("GetWeatherV2"), "get_weather_v2");
        assert_eq!(snake_case("IPv4Lookup"), "i_pv4_lookup");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("Chat Title-Gen"), "chat_title_gen");
    }

    #[test]
    fn name_derived_from_type() {
        let spec = ToolSpec::builder("Weather").build_for::<GetWeather>().unwrap();
        assert_eq!(spec.name(), "get_weather");

        let spec = ToolSpec::builder("HTTP").build_for::<HTTPRequestTool>().unwrap();
        assert_eq!(spec.name(), "http_request_tool");
    }

    #[test]
    fn explicit_name_wins() {
        let spec = ToolSpec::builder("Weather")
            .name("weather_now")
            .build_for::<GetWeather>()
            .unwrap();
        assert_eq!(spec.name(), "weather_now");
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(ToolSpec::builder("x").name("").build().is_err());
        assert!(ToolSpec::builder("x").name("has space").build().is_err());
        assert!(ToolSpec::builder("x").name("a".repeat(65)).build().is_err());
        assert!(ToolSpec::builder("x").build().is_err());
    }

    #[test]
    fn empty_description_rejected() {
        assert!(ToolSpec::builder("  ").name("t").build().is_err());
    }

    #[test]
    fn duplicate_params_rejected() {
        let err = ToolSpec::builder("x")
            .name("t")
            .param(Param::required("a", ParamType::String))
            .param(Param::required("a", ParamType::Integer))
            .build()
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSpec(_)));
    }

    #[test]
    fn literal_derives_enum() {
        let spec = ToolSpec::builder("Convert temperature")
            .name("convert")
            .param(Param::required("unit", ParamType::literal(["celsius", "fahrenheit"])))
            .build()
            .unwrap();
        let value = spec.schema_value();
        assert_eq!(
            value["function"]["parameters"]["properties"]["unit"],
            json!({"type": "string", "enum": ["celsius", "fahrenheit"]})
        );
    }

    #[test]
    fn literal_type_follows_first_value() {
        assert_eq!(ParamType::literal([1, 2, 3]).json_type(), JsonType::Integer);
        assert_eq!(ParamType::literal([0.5, 1.5]).json_type(), JsonType::Number);
        assert_eq!(ParamType::literal([true]).json_type(), JsonType::Boolean);
        assert_eq!(ParamType::Literal(vec![]).json_type(), JsonType::String);
    }

    #[test]
    fn optional_and_union_resolve_first_non_null() {
        assert_eq!(ParamType::optional(ParamType::Integer).json_type(), JsonType::Integer);
        assert_eq!(
            ParamType::Union(vec![ParamType::Null, ParamType::Number, ParamType::String]).json_type(),
            JsonType::Number
        );
        assert_eq!(ParamType::Union(vec![ParamType::Null]).json_type(), JsonType::String);
    }

    #[test]
    fn arrays_carry_items() {
        let p = Param::required("tags", ParamType::array_of(ParamType::Integer));
        let schema = p.to_property_schema();
        assert_eq!(schema.r#type, JsonType::Array);
        assert_eq!(schema.items, Some(ItemsSchema { r#type: JsonType::Integer }));
    }

    #[test]
    fn rust_types_map_to_json_types() {
        assert_eq!(ParamType::of::<String>(), ParamType::String);
        assert_eq!(ParamType::of::<u32>(), ParamType::Integer);
        assert_eq!(ParamType::of::<f64>().json_type(), JsonType::Number);
        assert_eq!(ParamType::of::<bool>(), ParamType::Boolean);
        assert_eq!(
            ParamType::of::<Vec<i64>>(),
            ParamType::array_of(ParamType::Integer)
        );
        assert_eq!(
            ParamType::of::<Option<String>>(),
            ParamType::optional(ParamType::String)
        );
        assert_eq!(
            ParamType::of::<std::collections::HashMap<String, u8>>(),
            ParamType::Object
        );
        assert_eq!(ParamType::of::<GetWeather>().json_type(), JsonType::String);
    }

    #[test]
    fn required_iff_no_default() {
        let spec = ToolSpec::builder("Search")
            .name("search")
            .param(Param::required("query", ParamType::String))
            .param(Param::optional("limit", ParamType::Integer, 10))
            .build()
            .unwrap();
        let params = spec.schema().function.parameters.as_ref().unwrap();
        assert_eq!(params.required, vec!["query".to_string()]);
        assert_eq!(params.properties["limit"].default, Some(json!(10)));
    }

    #[test]
    fn property_overrides_and_extends() {
        let p = Param::required("unit", ParamType::literal(["c", "f"])).with(
            Property::new()
                .description("Unit")
                .enums(["k"])
                .pattern("^[a-z]$")
                .examples(["k"])
                .extra("deprecated", false),
        );
        let value = serde_json::to_value(p.to_property_schema()).unwrap();
        assert_eq!(value["enum"], json!(["k"]));
        assert_eq!(value["description"], "Unit");
        assert_eq!(value["pattern"], "^[a-z]$");
        assert_eq!(value["examples"], json!(["k"]));
        assert_eq!(value["deprecated"], json!(false));
    }

    #[test]
    fn bounds_use_json_schema_keywords() {
        let p = Param::required("name", ParamType::String)
            .with(Property::new().length(Some(1), Some(8)).minimum(0));
        let value = serde_json::to_value(p.to_property_schema()).unwrap();
        assert_eq!(value["minLength"], 1);
        assert_eq!(value["maxLength"], 8);
        assert_eq!(value["minimum"], 0);
        assert!(value.get("maxItems").is_none());
    }

    #[test]
    fn no_params_omits_parameters() {
        let spec = ToolSpec::builder("Current time").name("now").build().unwrap();
        let value = spec.schema_value();
        assert_eq!(value["type"], "function");
        assert!(value["function"].get("parameters").is_none());
    }

    #[test]
    fn schema_is_cached() {
        let spec = ToolSpec::builder("Weather").build_for::<GetWeather>().unwrap();
        let a: *const ToolSchema = spec.schema();
        let b: *const ToolSchema = spec.schema();
        assert_eq!(a, b);
    }
}
