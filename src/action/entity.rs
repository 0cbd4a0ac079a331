use super::ActionKind;
use super::executable::{CompletionError, Executable, OrderingKey, PendingAction};
use super::work::ActionWork;
use crate::core::{Identifier, InstanceKey, Result, TableSpace, Value};
use crate::statement::StatementManager;
use std::fmt;

/// Snapshot of one property of an entity being inserted
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Scalar(Value),
    /// Reference to another live entity
    Entity(InstanceKey),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Scalar(Value::Null))
    }

    pub fn referenced_instance(&self) -> Option<InstanceKey> {
        match self {
            Self::Entity(key) => Some(*key),
            _ => None,
        }
    }
}

/// Mapping type of an entity property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Scalar,
    Entity { entity_name: String },
    Collection,
}

impl PropertyType {
    pub fn is_entity_type(&self) -> bool {
        matches!(self, Self::Entity { .. })
    }
}

/// Pending insert of one entity instance
pub struct EntityInsert {
    entity_name: String,
    id: Option<Identifier>,
    instance: InstanceKey,
    state: Vec<PropertyValue>,
    types: Vec<PropertyType>,
    spaces: Vec<TableSpace>,
    identity: bool,
    work: Box<dyn ActionWork>,
}

impl EntityInsert {
    pub fn new(
        entity_name: impl Into<String>,
        instance: InstanceKey,
        work: impl ActionWork + 'static,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: None,
            instance,
            state: Vec::new(),
            types: Vec::new(),
            spaces: Vec::new(),
            identity: false,
            work: Box::new(work),
        }
    }

    pub fn with_id(mut self, id: impl Into<Identifier>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, property_type: PropertyType, value: PropertyValue) -> Self {
        self.types.push(property_type);
        self.state.push(value);
        self
    }

    pub fn with_table_space(mut self, space: impl Into<TableSpace>) -> Self {
        self.spaces.push(space.into());
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn id(&self) -> Option<&Identifier> {
        self.id.as_ref()
    }

    pub fn instance(&self) -> InstanceKey {
        self.instance
    }

    pub fn state(&self) -> &[PropertyValue] {
        &self.state
    }

    pub fn property_types(&self) -> &[PropertyType] {
        &self.types
    }

    /// Property values whose type is an entity reference and whose value is set
    pub fn entity_references(&self) -> impl Iterator<Item = InstanceKey> + '_ {
        self.types
            .iter()
            .zip(&self.state)
            .filter(|(ty, value)| ty.is_entity_type() && !value.is_null())
            .filter_map(|(_, value)| value.referenced_instance())
    }

    /// Whether the identifier is generated by the insert itself
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub(crate) fn mark_identity(&mut self) {
        self.identity = true;
    }

    pub fn kind(&self) -> ActionKind {
        if self.identity {
            ActionKind::IdentityInsert
        } else {
            ActionKind::Insert
        }
    }
}

impl fmt::Debug for EntityInsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityInsert")
            .field("entity_name", &self.entity_name)
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Executable for EntityInsert {
    fn table_spaces(&self) -> &[TableSpace] {
        &self.spaces
    }

    fn has_after_transaction_completion(&self) -> bool {
        self.work.has_after_transaction_completion()
    }

    fn before_executions(&mut self) -> Result<()> {
        self.work.before_executions()
    }

    fn execute(&mut self, statements: &mut StatementManager) -> Result<()> {
        self.work.execute(statements)
    }

    fn after_transaction_completion(
        &mut self,
        success: bool,
    ) -> std::result::Result<(), CompletionError> {
        self.work.after_transaction_completion(success)
    }

    fn ordering_key(&self) -> OrderingKey {
        OrderingKey {
            name: self.entity_name.clone(),
            id: self.id.clone(),
        }
    }

    fn describe(&self) -> PendingAction {
        PendingAction {
            kind: self.kind(),
            name: self.entity_name.clone(),
            id: self.id.clone(),
            table_spaces: self.spaces.clone(),
        }
    }
}

/// Pending update or delete of a persistent entity
pub struct EntityAction {
    entity_name: String,
    id: Identifier,
    instance: InstanceKey,
    spaces: Vec<TableSpace>,
    kind: ActionKind,
    work: Box<dyn ActionWork>,
}

impl EntityAction {
    pub fn new(
        entity_name: impl Into<String>,
        id: impl Into<Identifier>,
        instance: InstanceKey,
        work: impl ActionWork + 'static,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: id.into(),
            instance,
            spaces: Vec::new(),
            kind: ActionKind::Update,
            work: Box::new(work),
        }
    }

    pub fn with_table_space(mut self, space: impl Into<TableSpace>) -> Self {
        self.spaces.push(space.into());
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn instance(&self) -> InstanceKey {
        self.instance
    }

    /// Update or delete, as decided by the buffer it was queued into
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ActionKind) {
        self.kind = kind;
    }
}

impl fmt::Debug for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAction")
            .field("entity_name", &self.entity_name)
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Executable for EntityAction {
    fn table_spaces(&self) -> &[TableSpace] {
        &self.spaces
    }

    fn has_after_transaction_completion(&self) -> bool {
        self.work.has_after_transaction_completion()
    }

    fn before_executions(&mut self) -> Result<()> {
        self.work.before_executions()
    }

    fn execute(&mut self, statements: &mut StatementManager) -> Result<()> {
        self.work.execute(statements)
    }

    fn after_transaction_completion(
        &mut self,
        success: bool,
    ) -> std::result::Result<(), CompletionError> {
        self.work.after_transaction_completion(success)
    }

    fn ordering_key(&self) -> OrderingKey {
        OrderingKey {
            name: self.entity_name.clone(),
            id: Some(self.id.clone()),
        }
    }

    fn describe(&self) -> PendingAction {
        PendingAction {
            kind: self.kind,
            name: self.entity_name.clone(),
            id: Some(self.id.clone()),
            table_spaces: self.spaces.clone(),
        }
    }
}
