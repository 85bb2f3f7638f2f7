//! Scenario files and the session built from them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use overload::{
    CachePolicy, ClassRegistry, Diagnostics, DispatchConfig, DispatchError, FinalizeHook, GraphError,
    Implementation, Namespace, Signature, TypeGraph, TypeKey,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::report::{CallOutcome, CallReport, Report};

/// Errors raised while loading or building a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown type `{name}` in {context}")]
    UnknownType { name: String, context: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A type and its immediate parents. Parents must be declared earlier.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateDecl {
    pub label: String,
    #[serde(default)]
    pub signature: Vec<String>,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

/// A free operation, or a method when nested in a [`ClassDecl`].
///
/// `plain` binds the name to a single implementation first, so any later
/// candidate promotes it to the generic fallback.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDecl {
    pub name: String,
    #[serde(default)]
    pub plain: Option<String>,
    #[serde(default)]
    pub generic: Option<String>,
    #[serde(default)]
    pub candidates: Vec<CandidateDecl>,
}

/// Methods declared by one type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<OperationDecl>,
}

/// A call to perform. With `class` set, the operation is a method of that
/// type and the type itself is passed as the receiver.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallDecl {
    pub operation: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub class: Option<String>,
}

impl CallDecl {
    /// The call as written, e.g. `T2.m(int, str)`.
    pub fn render(&self) -> String {
        let args = self.args.join(", ");
        match &self.class {
            Some(class) => format!("{class}.{}({args})", self.operation),
            None => format!("{}({args})", self.operation),
        }
    }
}

/// A parsed scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub config: Option<DispatchConfig>,
    pub types: Vec<TypeDecl>,
    pub operations: Vec<OperationDecl>,
    pub classes: Vec<ClassDecl>,
    pub calls: Vec<CallDecl>,
}

impl Scenario {
    pub fn from_toml_str(source: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// The scenario's own `[config]` table, or the defaults.
    pub fn config(&self) -> DispatchConfig {
        self.config.unwrap_or_default()
    }

    /// Define the types, register every operation and method, and finalize
    /// every type in definition order so parents merge before children.
    pub fn build(&self, config: DispatchConfig) -> Result<Session, ScenarioError> {
        let mut graph = TypeGraph::new();
        for decl in &self.types {
            let parents = decl
                .parents
                .iter()
                .map(|parent| lookup_type(&graph, parent, || format!("parents of `{}`", decl.name)))
                .collect::<Result<Vec<_>, _>>()?;
            graph.define(&decl.name, &parents)?;
        }

        let functions = Arc::new(Namespace::with_config(config));
        let classes = ClassRegistry::with_config(config);
        let mut diagnostics = Diagnostics::new();

        for operation in &self.operations {
            diagnostics.extend(operation.register(&graph, &functions)?);
        }
        for class in &self.classes {
            let ty = lookup_type(&graph, &class.name, || "class declarations".to_string())?;
            let namespace = classes.namespace(ty);
            for method in &class.methods {
                diagnostics.extend(method.register(&graph, &namespace)?);
            }
        }
        for ty in graph.keys() {
            diagnostics.extend(classes.type_finalized(&graph, ty)?);
        }

        info!(
            types = graph.len(),
            operations = self.operations.len(),
            classes = self.classes.len(),
            diagnostics = diagnostics.len(),
            "built scenario"
        );
        let diagnostics = diagnostics.iter().map(|diagnostic| diagnostic.render(&graph)).collect();
        Ok(Session {
            graph,
            functions,
            classes,
            diagnostics,
        })
    }
}

impl OperationDecl {
    fn register(
        &self,
        graph: &TypeGraph,
        namespace: &Namespace<TypeKey, String>,
    ) -> Result<Diagnostics, ScenarioError> {
        let mut diagnostics = Diagnostics::new();

        if let Some(label) = &self.plain {
            namespace.define(&self.name, labelled(label));
        }
        if let Some(label) = &self.generic {
            diagnostics.extend(namespace.register_fallback(&self.name, labelled(label), false));
        }
        for candidate in &self.candidates {
            let signature = candidate
                .signature
                .iter()
                .map(|name| lookup_type(graph, name, || format!("signature of `{}`", candidate.label)))
                .collect::<Result<Vec<_>, _>>()?;
            diagnostics.extend(namespace.register(
                &self.name,
                labelled(&candidate.label),
                Signature::from(signature),
                candidate.override_existing,
            ));
        }
        Ok(diagnostics)
    }
}

/// An implementation that returns its own label.
fn labelled(label: &str) -> Implementation<TypeKey, String> {
    let label = label.to_string();
    Implementation::new(label.clone(), move |_, _| label.clone())
}

fn lookup_type(
    graph: &TypeGraph,
    name: &str,
    context: impl FnOnce() -> String,
) -> Result<TypeKey, ScenarioError> {
    graph.lookup(name).ok_or_else(|| ScenarioError::UnknownType {
        name: name.to_string(),
        context: context(),
    })
}

/// A built scenario, ready to take calls.
pub struct Session {
    graph: TypeGraph,
    functions: Arc<Namespace<TypeKey, String>>,
    classes: ClassRegistry<TypeKey, String>,
    diagnostics: Vec<String>,
}

impl Session {
    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    /// Diagnostics produced while building, rendered with type names.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Perform every call in order. Failed calls are reported, not returned.
    pub fn run(&self, calls: &[CallDecl]) -> Report {
        let calls = calls
            .iter()
            .map(|call| {
                let outcome = self
                    .perform(call)
                    .unwrap_or_else(|err| CallOutcome::Failed { error: err.to_string() });
                debug!(call = %call.render(), outcome = ?outcome, "performed call");
                CallReport {
                    call: call.render(),
                    outcome,
                }
            })
            .collect();

        Report {
            diagnostics: self.diagnostics.clone(),
            calls,
        }
    }

    fn perform(&self, call: &CallDecl) -> Result<CallOutcome, ScenarioError> {
        let context = || format!("call `{}`", call.render());
        let args = call
            .args
            .iter()
            .map(|name| lookup_type(&self.graph, name, context))
            .collect::<Result<Vec<_>, _>>()?;

        let (namespace, receiver) = match &call.class {
            Some(class) => {
                let ty = lookup_type(&self.graph, class, context)?;
                let namespace = self
                    .classes
                    .method_namespace(&self.graph, ty, &call.operation)
                    .ok_or_else(|| DispatchError::UnknownOperation {
                        name: call.operation.clone(),
                    })?;
                (namespace, Some(ty))
            }
            None => (Arc::clone(&self.functions), None),
        };

        let label = namespace.call(&self.graph, &call.operation, receiver.as_ref(), &args)?;

        // A successful call that no candidate accounts for went to the generic.
        Ok(match namespace.table(&call.operation) {
            None => CallOutcome::Plain { label },
            Some(table) => match table.resolve(&self.graph, &args, CachePolicy::Bypass) {
                Ok(Some(_)) => CallOutcome::Resolved { label },
                _ => CallOutcome::Generic { label },
            },
        })
    }
}
