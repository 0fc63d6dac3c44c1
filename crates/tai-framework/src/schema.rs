use std::sync::Arc;

use tracing::warn;

use tai::attribute::Attribute;
use tai::capability::AttributeCapability;
use tai::catalog;
use tai::metadata::{AttrId, AttrMetadata};
use tai::object::ObjectType;
use tai::value::AttributeValue;

use crate::Map;
use crate::error::Result;
use crate::fsm::FsmState;

/// A hook applying an attribute value to the device.
///
/// The hook receives the state the device would move to and may lower it.
/// Returning [`crate::error::ErrorKind::NotExecuted`] counts as success.
pub type Setter<C> = Arc<dyn Fn(&Attribute, &mut FsmState, &C) -> Result<()> + Send + Sync>;

/// A hook reading an attribute value from the device.
pub type Getter<C> = Arc<dyn Fn(&mut Attribute, &C) -> Result<()> + Send + Sync>;

/// A hook refining the capability of an attribute.
pub type CapabilityHook<C> =
    Arc<dyn Fn(&mut AttributeCapability, &C) -> Result<()> + Send + Sync>;

/// An attribute value validator.
#[derive(Clone)]
pub enum Validator {
    /// Accepts the listed enumeration values.
    Enum(Vec<i32>),
    /// Accepts numeric values within the inclusive range.
    Range {
        /// Minimum value.
        min: f64,
        /// Maximum value.
        max: f64,
    },
    /// Accepts values for which the predicate holds.
    Custom(Arc<dyn Fn(&AttributeValue) -> bool + Send + Sync>),
}

impl Validator {
    /// Creates a [`Validator::Custom`].
    pub fn custom(predicate: impl Fn(&AttributeValue) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether the value is acceptable.
    #[must_use]
    pub fn validate(&self, value: &AttributeValue) -> bool {
        match self {
            Self::Enum(values) => value.as_i32().is_some_and(|v| values.contains(&v)),
            Self::Range { min, max } => value.as_f64().is_some_and(|v| v >= *min && v <= *max),
            Self::Custom(predicate) => predicate(value),
        }
    }

    // Narrows a capability to the accepted values.
    fn refine(&self, capability: &mut AttributeCapability, meta: &AttrMetadata) {
        match self {
            Self::Enum(values) => {
                *capability = std::mem::take(capability).with_supported(values.iter().copied());
            }
            Self::Range { min, max } => {
                *capability = std::mem::take(capability).with_bounds(meta.kind, *min, *max);
            }
            Self::Custom(_) => {}
        }
    }
}

impl core::fmt::Debug for Validator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Enum(values) => f.debug_tuple("Enum").field(values).finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Schema entry of an attribute.
pub struct AttributeInfo<C> {
    meta: &'static AttrMetadata,
    fsm_state: FsmState,
    default: Option<AttributeValue>,
    validator: Option<Validator>,
    setter: Option<Setter<C>>,
    getter: Option<Getter<C>>,
    capability: Option<CapabilityHook<C>>,
    no_store: bool,
}

impl<C> AttributeInfo<C> {
    fn new(meta: &'static AttrMetadata) -> Self {
        Self {
            meta,
            fsm_state: FsmState::INIT,
            default: None,
            validator: None,
            setter: None,
            getter: None,
            capability: None,
            no_store: false,
        }
    }

    /// Sets the state the device must go back to after a change.
    ///
    /// [`FsmState::INIT`] means no hint.
    #[must_use]
    pub const fn fsm_state(mut self, state: FsmState) -> Self {
        self.fsm_state = state;
        self
    }

    /// Overrides the metadata default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets the setter hook.
    #[must_use]
    pub fn setter(
        mut self,
        setter: impl Fn(&Attribute, &mut FsmState, &C) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Sets the getter hook.
    #[must_use]
    pub fn getter(
        mut self,
        getter: impl Fn(&mut Attribute, &C) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Sets the capability hook.
    #[must_use]
    pub fn capability(
        mut self,
        hook: impl Fn(&mut AttributeCapability, &C) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.capability = Some(Arc::new(hook));
        self
    }

    /// Runs the setter hook only, without storing the value.
    #[must_use]
    pub const fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    /// Returns the attribute metadata.
    #[must_use]
    pub const fn meta(&self) -> &'static AttrMetadata {
        self.meta
    }

    /// Returns the state hint.
    #[must_use]
    pub const fn state_hint(&self) -> FsmState {
        self.fsm_state
    }

    /// Returns the default value, the schema override first.
    #[must_use]
    pub fn default(&self) -> Option<&AttributeValue> {
        self.default.as_ref().or(self.meta.default.as_ref())
    }

    /// Whether the value is acceptable for this attribute.
    #[must_use]
    pub fn validate(&self, value: &AttributeValue) -> bool {
        value.kind() == self.meta.kind
            && self
                .validator
                .as_ref()
                .is_none_or(|validator| validator.validate(value))
    }

    pub(crate) fn setter_hook(&self) -> Option<&Setter<C>> {
        self.setter.as_ref()
    }

    pub(crate) fn getter_hook(&self) -> Option<&Getter<C>> {
        self.getter.as_ref()
    }

    pub(crate) const fn is_stored(&self) -> bool {
        !self.no_store
    }

    /// Computes the capability of the attribute.
    ///
    /// # Errors
    ///
    /// Propagates the capability hook failure.
    pub fn capability_of(&self, context: &C) -> Result<AttributeCapability> {
        let mut capability = AttributeCapability::from_metadata(self.meta);
        if let Some(default) = &self.default {
            capability.default = Some(default.clone());
        }
        if let Some(validator) = &self.validator {
            validator.refine(&mut capability, self.meta);
        }
        if let Some(hook) = &self.capability {
            hook(&mut capability, context)?;
        }
        Ok(capability)
    }
}

/// The schema of an object type: the attributes an adapter handles.
pub struct SchemaTable<C> {
    object_type: ObjectType,
    attributes: Map<AttrId, AttributeInfo<C>>,
}

impl<C> SchemaTable<C> {
    /// Creates an empty [`SchemaTable`].
    #[must_use]
    pub fn builder(object_type: ObjectType) -> Self {
        Self {
            object_type,
            attributes: Map::default(),
        }
    }

    /// Declares an attribute.
    ///
    /// Attributes absent from the metadata catalog are ignored.
    #[must_use]
    pub fn attribute(
        mut self,
        id: AttrId,
        info: impl FnOnce(AttributeInfo<C>) -> AttributeInfo<C>,
    ) -> Self {
        match catalog::attr_metadata(self.object_type, id) {
            Some(meta) => {
                self.attributes.insert(id, info(AttributeInfo::new(meta)));
            }
            None => warn!("No metadata for {} attribute {id}", self.object_type),
        }
        self
    }

    /// Returns the object type.
    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Returns the entry of an attribute.
    #[must_use]
    pub fn get(&self, id: AttrId) -> Option<&AttributeInfo<C>> {
        self.attributes.get(&id)
    }

    /// Whether the attribute is declared.
    #[must_use]
    pub fn contains(&self, id: AttrId) -> bool {
        self.attributes.contains_key(&id)
    }

    /// Iterates over the declared attributes.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeInfo<C>> {
        self.attributes.values()
    }

    /// Number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether no attribute is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tai::catalog::{module, network_interface};
    use tai::object::ObjectType;
    use tai::value::AttributeValue;

    use crate::fsm::FsmState;

    use super::{SchemaTable, Validator};

    #[test]
    fn attribute_defaults() {
        let schema = SchemaTable::<()>::builder(ObjectType::Module)
            .attribute(module::ADMIN_STATUS, |info| {
                info.validator(Validator::Enum(vec![1, 2]))
                    .fsm_state(FsmState::WAITING_CONFIGURATION)
            })
            .attribute(module::NUM_HOST_INTERFACES, |info| info.default_value(5u32))
            .attribute(999, |info| info);

        assert_eq!(schema.len(), 2);
        assert!(!schema.contains(999));

        let admin = schema.get(module::ADMIN_STATUS).unwrap();
        assert_eq!(admin.state_hint(), FsmState::WAITING_CONFIGURATION);
        assert_eq!(admin.default(), Some(&AttributeValue::S32(1)));
        assert!(admin.validate(&AttributeValue::S32(2)));
        assert!(!admin.validate(&AttributeValue::S32(3)));
        assert!(!admin.validate(&AttributeValue::U32(2)));

        let hosts = schema.get(module::NUM_HOST_INTERFACES).unwrap();
        assert_eq!(hosts.default(), Some(&AttributeValue::U32(5)));
        assert_eq!(hosts.state_hint(), FsmState::INIT);
    }

    #[test]
    fn capabilities() {
        let schema = SchemaTable::<u32>::builder(ObjectType::NetworkInterface)
            .attribute(network_interface::OUTPUT_POWER, |info| {
                info.validator(Validator::Range {
                    min: -10.0,
                    max: 0.0,
                })
            })
            .attribute(network_interface::TX_LASER_FREQ, |info| {
                info.capability(|capability, limit| {
                    capability.max = Some(AttributeValue::U64(u64::from(*limit)));
                    Ok(())
                })
            });

        let power = schema
            .get(network_interface::OUTPUT_POWER)
            .unwrap()
            .capability_of(&0)
            .unwrap();
        assert_eq!(power.min, Some(AttributeValue::Float(-10.0)));
        assert_eq!(power.max, Some(AttributeValue::Float(0.0)));
        assert!(schema
            .get(network_interface::OUTPUT_POWER)
            .unwrap()
            .validate(&AttributeValue::Float(-3.5)));

        let freq = schema
            .get(network_interface::TX_LASER_FREQ)
            .unwrap()
            .capability_of(&42)
            .unwrap();
        assert_eq!(freq.max, Some(AttributeValue::U64(42)));
    }

    #[test]
    fn custom_validator() {
        let validator = Validator::custom(|value| value.as_str().is_some_and(|s| !s.is_empty()));
        assert!(validator.validate(&AttributeValue::CharList("1".into())));
        assert!(!validator.validate(&AttributeValue::CharList(String::new())));
    }
}
