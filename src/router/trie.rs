use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::http::request::Method;
use crate::middleware::Middleware;
use crate::router::{Handler, HandlerResult};

/// Characters that only make sense in a regular expression. A literal token
/// containing any of them is matched as a pattern instead of by equality.
const REGEX_META: &[char] = &['^', '$', '(', ')', '[', ']', '{', '}', '|', '+', '?', '\\'];

/// Reserved parameter key holding the path captured by a glob segment.
pub const WILDCARD_PARAM: &str = "wildcard";

#[derive(Debug, Clone)]
enum TokenKind {
    Literal,
    /// `:name` or `:name(regex)`; a constraint that failed to compile is
    /// kept as `Err` and never matches
    Param {
        name: String,
        constraint: Option<Result<Regex, String>>,
    },
    Glob {
        prefix: String,
        suffix: String,
    },
    Pattern(Result<Regex, String>),
}

impl TokenKind {
    fn classify(token: &str) -> Self {
        if token.len() > 1 && token.starts_with(':') {
            let body = &token[1..];
            return match body.split_once('(') {
                Some((name, rest)) => {
                    let pattern = rest.strip_suffix(')').unwrap_or(rest);
                    TokenKind::Param {
                        name: name.to_string(),
                        constraint: Some(compile(token, pattern)),
                    }
                }
                None => TokenKind::Param {
                    name: body.to_string(),
                    constraint: None,
                },
            };
        }

        if let Some((prefix, suffix)) = token.split_once('*') {
            return TokenKind::Glob {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            };
        }

        if token.contains(REGEX_META) {
            return TokenKind::Pattern(compile(token, token));
        }

        TokenKind::Literal
    }

    fn param_name(&self) -> Option<&str> {
        match self {
            TokenKind::Param { name, .. } => Some(name),
            _ => None,
        }
    }
}

fn compile(token: &str, pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| {
        warn!(token = %token, error = %e, "route pattern does not compile, segment will never match");
        e.to_string()
    })
}

/// A node of the routing trie.
pub struct Node {
    method: Method,
    token: String,
    kind: TokenKind,
    handler: Option<Arc<dyn Handler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    children: VecDeque<usize>,
}

impl Node {
    fn new(method: Method, token: &str) -> Self {
        Self {
            method,
            token: token.to_string(),
            kind: TokenKind::classify(token),
            handler: None,
            middleware: Vec::new(),
            children: VecDeque::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    fn set_endpoint(&mut self, handler: Arc<dyn Handler>, middleware: Option<Vec<Arc<dyn Middleware>>>) {
        self.handler = Some(handler);
        if let Some(middleware) = middleware {
            self.middleware = middleware;
        }
    }
}

/// Arena-backed routing trie.
///
/// Node 0 is the root (`/`, GET). Children are kept in match order: new
/// literal, parameter and glob segments go to the front, bare `*` segments to
/// the back.
pub struct Trie {
    nodes: Vec<Node>,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Method::GET, "/")],
        }
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn root(&self) -> &Node {
        &self.nodes[Self::ROOT]
    }

    /// Child indices of `idx`, in match order.
    pub fn children(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[idx].children.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        middleware: Option<Vec<Arc<dyn Middleware>>>,
        handler: Arc<dyn Handler>,
    ) {
        let segments = split_path(pattern);

        // Follow what is already there.
        let mut current = Self::ROOT;
        let mut depth = 0;
        while depth < segments.len() {
            let segment = segments[depth];
            let next = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].method == method && self.nodes[c].token == segment);

            match next {
                Some(child) => {
                    current = child;
                    depth += 1;
                }
                None => break,
            }
        }

        if depth == segments.len() && self.nodes[current].method == method {
            self.nodes[current].set_endpoint(handler, middleware);
            return;
        }

        if segments.is_empty() {
            // Root registered for a method other than GET.
            let existing = self.nodes[Self::ROOT]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].method == method && self.nodes[c].token == "/");

            let idx = match existing {
                Some(idx) => idx,
                None => self.push_child(Self::ROOT, Node::new(method, "/"), false),
            };
            self.nodes[idx].set_endpoint(handler, middleware);
            return;
        }

        for segment in &segments[depth..] {
            let node = Node::new(method, segment);

            let sibling = node
                .kind
                .param_name()
                .and_then(|name| self.find_param_sibling(current, method, name));

            if let Some(sibling) = sibling {
                if matches!(node.kind, TokenKind::Param { constraint: Some(_), .. }) {
                    let target = &mut self.nodes[sibling];
                    target.token = node.token;
                    target.kind = node.kind;
                }
                current = sibling;
                continue;
            }

            current = self.push_child(current, node, *segment == "*");
        }

        self.nodes[current].set_endpoint(handler, middleware);
    }

    fn find_param_sibling(&self, parent: usize, method: Method, name: &str) -> Option<usize> {
        self.nodes[parent].children.iter().copied().find(|&c| {
            let child = &self.nodes[c];
            child.method == method && child.kind.param_name() == Some(name)
        })
    }

    fn push_child(&mut self, parent: usize, node: Node, append: bool) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);

        let children = &mut self.nodes[parent].children;
        if append {
            children.push_back(idx);
        } else {
            children.push_front(idx);
        }

        idx
    }

    /// Finds the handler for `method` and `path`.
    ///
    /// An exact literal child beats any pattern child at the same level;
    /// among pattern children the first in match order wins. A walk that
    /// stops early falls back to the deepest glob it passed through.
    pub fn resolve(&self, method: Method, path: &str) -> HandlerResult {
        let segments = split_path(path);

        if segments.is_empty() {
            if self.root().method == method {
                return self.result(Self::ROOT, HashMap::new());
            }

            return self.nodes[Self::ROOT]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].method == method && self.nodes[c].token == "/")
                .map(|idx| self.result(idx, HashMap::new()))
                .unwrap_or_else(HandlerResult::not_found);
        }

        let mut params = HashMap::new();
        let mut catch_all: Option<(usize, HashMap<String, String>)> = None;
        let mut current = Self::ROOT;

        for (depth, segment) in segments.iter().enumerate() {
            let matched = self
                .literal_child(current, method, segment)
                .or_else(|| self.pattern_child(current, method, &segments, depth, &mut params));

            match matched {
                Some((child, is_glob)) => {
                    current = child;
                    if is_glob {
                        catch_all = Some((child, params.clone()));
                    }
                }
                None => {
                    return match catch_all {
                        Some((idx, params)) => self.result(idx, params),
                        None => HandlerResult::not_found(),
                    };
                }
            }
        }

        match catch_all {
            Some((idx, params)) if !self.nodes[current].has_handler() => self.result(idx, params),
            _ => self.result(current, params),
        }
    }

    fn literal_child(&self, parent: usize, method: Method, segment: &str) -> Option<(usize, bool)> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| {
                let child = &self.nodes[c];
                child.method == method
                    && matches!(child.kind, TokenKind::Literal)
                    && child.token == segment
            })
            .map(|c| (c, false))
    }

    fn pattern_child(
        &self,
        parent: usize,
        method: Method,
        segments: &[&str],
        depth: usize,
        params: &mut HashMap<String, String>,
    ) -> Option<(usize, bool)> {
        let segment = segments[depth];

        for &c in &self.nodes[parent].children {
            let child = &self.nodes[c];
            if child.method != method {
                continue;
            }

            match &child.kind {
                TokenKind::Param { name, constraint } => {
                    let ok = match constraint {
                        None => true,
                        Some(Ok(re)) => re.is_match(segment),
                        Some(Err(_)) => false,
                    };
                    if ok {
                        params.insert(name.clone(), segment.to_string());
                        return Some((c, false));
                    }
                }
                TokenKind::Glob { prefix, suffix } => {
                    if segment.len() >= prefix.len() + suffix.len()
                        && segment.starts_with(prefix.as_str())
                        && segment.ends_with(suffix.as_str())
                    {
                        params.insert(
                            WILDCARD_PARAM.to_string(),
                            format!("/{}", segments[depth..].join("/")),
                        );
                        return Some((c, true));
                    }
                }
                TokenKind::Pattern(Ok(re)) => {
                    if re.is_match(segment) {
                        return Some((c, false));
                    }
                }
                TokenKind::Pattern(Err(_)) | TokenKind::Literal => {}
            }
        }

        None
    }

    fn result(&self, idx: usize, params: HashMap<String, String>) -> HandlerResult {
        let node = &self.nodes[idx];
        match &node.handler {
            Some(handler) => HandlerResult {
                handler: Some(handler.clone()),
                params,
                middleware: node.middleware.clone(),
            },
            None => HandlerResult::not_found(),
        }
    }
}

/// Trims whitespace and surrounding slashes, then splits on `/`. The root
/// path yields no segments.
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim().trim_matches('/');

    if trimmed.is_empty() {
        return Vec::new();
    }

    trimmed.split('/').collect()
}
