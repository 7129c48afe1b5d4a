use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use futures::stream::{self, BoxStream, StreamExt};
use sheets_codec::{render_scalar, Record, RECORD_EXTENSION};
use sheets_store::tree::split_path;
use sheets_store::{BlobRef, MutableTree, Node};
use tracing::trace;

use crate::error::{TemplateError, TemplateResult};
use crate::expr::{self, Expr, Outcome};

const RECURSIVE_SUFFIX: &str = "/**";

static TEMPLATE_CACHE: LazyLock<Mutex<HashMap<String, Arc<Template>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// What a template component computes.
#[derive(Clone, Debug, PartialEq)]
pub enum ComponentKind {
    /// Fixed text.
    Literal,
    /// A field of the record. A recursive field may span several levels.
    Field { recursive: bool },
    /// An expression over the record.
    Expression(Expr),
}

/// One `/`-separated segment of a template.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    /// Literal text, field name, or expression source.
    pub name: String,
    pub prefix: String,
    pub suffix: String,
}

impl Component {
    pub fn is_recursive(&self) -> bool {
        matches!(self.kind, ComponentKind::Field { recursive: true })
    }

    /// Render this component against a (possibly partial) record.
    ///
    /// `Ok(None)` means the value is absent: a missing field, an undefined
    /// name in an expression, an empty string, or a value with no scalar
    /// form.
    pub fn render(&self, record: &Record) -> TemplateResult<Option<String>> {
        let raw = match &self.kind {
            ComponentKind::Literal => return Ok(Some(self.name.clone())),
            ComponentKind::Field { .. } => record.get(&self.name).and_then(render_scalar),
            ComponentKind::Expression(expr) => {
                let outcome =
                    expr::evaluate(expr, record).map_err(|source| TemplateError::Evaluation {
                        expr: self.name.clone(),
                        source,
                    })?;
                match outcome {
                    Outcome::Value(value) => value.display(),
                    Outcome::Undefined(name) => {
                        trace!(expr = %self.name, %name, "undefined name in path expression");
                        None
                    }
                }
            }
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let value = if self.is_recursive() {
            split_path(&raw).join("/")
        } else if raw.contains('/') {
            return Err(TemplateError::InvalidValue {
                component: self.name.clone(),
                value: raw,
            });
        } else {
            raw
        };
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}{value}{}", self.prefix, self.suffix)))
    }
}

/// A compiled record path template.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    source: String,
    components: Vec<Component>,
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Default)]
struct PendingComponent {
    expression: bool,
    prefix: String,
    name: String,
    suffix: String,
}

impl PendingComponent {
    fn finish(self) -> TemplateResult<Option<Component>> {
        let PendingComponent {
            expression,
            prefix,
            name,
            suffix,
        } = self;

        if !expression {
            if name.is_empty() || name == "." {
                return Ok(None);
            }
            return Ok(Some(Component {
                kind: ComponentKind::Literal,
                name,
                prefix,
                suffix,
            }));
        }

        let (kind, name) = if is_field_name(&name) {
            (ComponentKind::Field { recursive: false }, name)
        } else if let Some(field) = name
            .strip_suffix(RECURSIVE_SUFFIX)
            .map(str::trim_end)
            .filter(|field| is_field_name(field))
        {
            (ComponentKind::Field { recursive: true }, field.to_string())
        } else {
            let parsed = expr::parse(&name).map_err(|source| TemplateError::InvalidExpression {
                expr: name.clone(),
                source,
            })?;
            (ComponentKind::Expression(parsed), name)
        };
        Ok(Some(Component {
            kind,
            name,
            prefix,
            suffix,
        }))
    }
}

impl Template {
    /// Compile a template, reusing an earlier compilation of the same string.
    pub fn compile(source: &str) -> TemplateResult<Arc<Template>> {
        let mut cache = TEMPLATE_CACHE
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(template) = cache.get(source) {
            return Ok(Arc::clone(template));
        }
        let template = Arc::new(Self::parse(source)?);
        cache.insert(source.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Parse a template without consulting the cache.
    ///
    /// `${{ expr }}` opens an expression; `{{ field }}` is accepted as well.
    /// Text before an expression in the same segment becomes its prefix and
    /// text after it its suffix.
    pub fn parse(source: &str) -> TemplateResult<Template> {
        let chars: Vec<char> = source.chars().collect();
        let mut components = Vec::new();
        let mut cur = PendingComponent::default();
        let mut i = 0;

        while i < chars.len() {
            let opener = if starts_with(&chars, i, "${{") {
                3
            } else if starts_with(&chars, i, "{{") {
                2
            } else {
                0
            };

            if opener > 0 {
                if cur.expression {
                    let segment: String = chars[..i].iter().collect();
                    let segment = segment.rsplit('/').next().unwrap_or_default().to_string();
                    return Err(TemplateError::MultipleExpressions(segment));
                }
                i += opener;
                let start = i;
                while !starts_with(&chars, i, "}}") {
                    if i >= chars.len() {
                        let text: String = chars[start..].iter().collect();
                        return Err(TemplateError::Unclosed(text.trim().to_string()));
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                cur.prefix = std::mem::take(&mut cur.name);
                cur.name = text.trim().to_string();
                cur.expression = true;
                i += 2;
                continue;
            }

            let c = chars[i];
            if c == '/' {
                components.extend(std::mem::take(&mut cur).finish()?);
            } else if cur.expression {
                cur.suffix.push(c);
            } else {
                cur.name.push(c);
            }
            i += 1;
        }
        components.extend(cur.finish()?);

        Ok(Template {
            source: source.to_string(),
            components,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Render the full relative path of a record (without extension).
    ///
    /// Every component must render; a template with no components renders
    /// nothing and is an error too.
    pub fn render(&self, record: &Record) -> TemplateResult<String> {
        let mut segments = Vec::with_capacity(self.components.len());
        for component in &self.components {
            match component.render(record)? {
                Some(segment) => segments.push(segment),
                None => return Err(TemplateError::Unrenderable(component.name.clone())),
            }
        }
        if segments.is_empty() {
            return Err(TemplateError::EmptyPath);
        }
        Ok(segments.join("/"))
    }

    /// Walk `tree` for record blobs that could match `query`.
    ///
    /// Components the query renders select exactly one child; the others
    /// enumerate every candidate. Record contents are never read, so the
    /// caller still has to check fields that are not part of the path.
    /// Paths are relative to `tree` and include the record extension.
    pub fn query_tree(
        self: &Arc<Self>,
        tree: MutableTree,
        query: Record,
    ) -> BoxStream<'static, TemplateResult<(String, BlobRef)>> {
        let walk = QueryWalk {
            template: Arc::clone(self),
            query,
            stack: vec![Frame {
                tree,
                depth: 0,
                prefix: String::new(),
            }],
            ready: VecDeque::new(),
            emitted: HashSet::new(),
            failed: false,
        };

        stream::unfold(walk, |mut walk| async move {
            loop {
                if let Some(found) = walk.ready.pop_front() {
                    return Some((Ok(found), walk));
                }
                if walk.failed {
                    return None;
                }
                let frame = walk.stack.pop()?;
                if let Err(err) = walk.step(frame) {
                    walk.failed = true;
                    walk.stack.clear();
                    return Some((Err(err), walk));
                }
            }
        })
        .boxed()
    }
}

struct Frame {
    tree: MutableTree,
    depth: usize,
    prefix: String,
}

struct QueryWalk {
    template: Arc<Template>,
    query: Record,
    stack: Vec<Frame>,
    ready: VecDeque<(String, BlobRef)>,
    emitted: HashSet<String>,
    failed: bool,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn record_file(name: &str) -> String {
    format!("{name}.{RECORD_EXTENSION}")
}

impl QueryWalk {
    fn emit(&mut self, path: String, blob: BlobRef) {
        if self.emitted.insert(path.clone()) {
            self.ready.push_back((path, blob));
        }
    }

    fn step(&mut self, frame: Frame) -> TemplateResult<()> {
        let template = Arc::clone(&self.template);
        let Some(component) = template.components.get(frame.depth) else {
            return Ok(());
        };
        let is_last = frame.depth + 1 == template.components.len();
        let mut next = Vec::new();

        let rendered = match component.render(&self.query) {
            Ok(rendered) => rendered,
            // No stored record can render to a value that spans levels.
            Err(TemplateError::InvalidValue { component: name, value }) => {
                trace!(component = %name, %value, "query value cannot match any path");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match (is_last, rendered) {
            (true, Some(name)) => {
                let file = record_file(&name);
                if let Some(Node::Blob(blob)) = frame.tree.get_child(&file)? {
                    self.emit(join(&frame.prefix, &file), blob);
                }
            }
            (true, None) => {
                let children = frame.tree.get_children()?;
                for (name, node) in &children {
                    match node {
                        Node::Blob(blob) if name.ends_with(&format!(".{RECORD_EXTENSION}")) => {
                            self.emit(join(&frame.prefix, name), *blob);
                        }
                        Node::Tree(subtree)
                            if component.is_recursive()
                                && !children.contains_key(&record_file(name)) =>
                        {
                            next.push(Frame {
                                tree: subtree.clone(),
                                depth: frame.depth,
                                prefix: join(&frame.prefix, name),
                            });
                        }
                        _ => {}
                    }
                }
            }
            (false, Some(name)) => {
                if let Some(subtree) = frame.tree.get_subtree(&name, false)? {
                    next.push(Frame {
                        tree: subtree,
                        depth: frame.depth + 1,
                        prefix: join(&frame.prefix, &name),
                    });
                }
            }
            (false, None) => {
                let children = frame.tree.get_children()?;
                for (name, node) in &children {
                    let Node::Tree(subtree) = node else {
                        continue;
                    };
                    if component.is_recursive() {
                        if children.contains_key(&record_file(name)) {
                            continue;
                        }
                        next.push(Frame {
                            tree: subtree.clone(),
                            depth: frame.depth + 1,
                            prefix: join(&frame.prefix, name),
                        });
                        next.push(Frame {
                            tree: subtree.clone(),
                            depth: frame.depth,
                            prefix: join(&frame.prefix, name),
                        });
                    } else {
                        next.push(Frame {
                            tree: subtree.clone(),
                            depth: frame.depth + 1,
                            prefix: join(&frame.prefix, name),
                        });
                    }
                }
            }
        }

        // Stack order: first child is visited first.
        self.stack.extend(next.into_iter().rev());
        Ok(())
    }
}
