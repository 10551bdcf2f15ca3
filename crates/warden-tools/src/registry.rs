//! Hot-reloadable tool catalogue.
//!
//! Readers load an immutable [`Catalogue`] snapshot without locking.
//! Mutations build a new catalogue off to the side and swap it in; a
//! writer mutex serializes mutations among themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::tool::Tool;

/// An immutable, registration-ordered set of tools.
#[derive(Debug, Default)]
pub struct Catalogue {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl Catalogue {
    fn from_tools(tools: Vec<Arc<Tool>>) -> RegistryResult<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.name.clone(), position).is_some() {
                return Err(RegistryError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(Self { tools, index })
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.iter()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalogue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registry of invocable tools.
pub struct ToolRegistry {
    current: ArcSwap<Catalogue>,
    writer: Mutex<()>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Catalogue::default()),
            writer: Mutex::new(()),
        }
    }

    /// Create a registry holding `tools` in order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if two tools share a name.
    pub fn with_tools(tools: Vec<Tool>) -> RegistryResult<Self> {
        let catalogue = Catalogue::from_tools(tools.into_iter().map(Arc::new).collect())?;
        Ok(Self {
            current: ArcSwap::from_pointee(catalogue),
            writer: Mutex::new(()),
        })
    }

    /// Register one tool at the end of the catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn register(&self, tool: Tool) -> RegistryResult<()> {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let snapshot = self.current.load_full();
        if snapshot.index.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name));
        }

        let mut tools = snapshot.tools.clone();
        let mut index = snapshot.index.clone();
        index.insert(tool.name.clone(), tools.len());
        debug!(tool = %tool.name, "registering tool");
        tools.push(Arc::new(tool));
        self.current.store(Arc::new(Catalogue { tools, index }));
        Ok(())
    }

    /// Replace the whole catalogue atomically.
    ///
    /// On error the current catalogue is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if two tools share a name.
    pub fn replace_all(&self, tools: Vec<Tool>) -> RegistryResult<()> {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let catalogue = Catalogue::from_tools(tools.into_iter().map(Arc::new).collect())?;
        info!(count = catalogue.len(), "replacing tool catalogue");
        self.current.store(Arc::new(catalogue));
        Ok(())
    }

    /// Look up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] if no tool has that name.
    pub fn lookup(&self, name: &str) -> RegistryResult<Arc<Tool>> {
        self.current
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_owned()))
    }

    /// A consistent snapshot of the catalogue.
    ///
    /// The snapshot can be iterated any number of times and is unaffected
    /// by later registrations or reloads.
    #[must_use]
    pub fn list(&self) -> Arc<Catalogue> {
        self.current.load_full()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.len())
            .finish_non_exhaustive()
    }
}
