/// Role of a markup attribute, decided from its name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrKind {
    Static,       // class="row"
    If,           // data-if="expr"
    Else,         // data-else
    For,          // data-for="item of items"
    Bind(String), // data-bind:text="expr"
    Model,        // data-model="path"
    State(String), // data-state:name="expr"
    On(String),   // onclick="handler"
}

impl AttrKind {
    pub fn classify(name: &str) -> AttrKind {
        match name {
            "data-if" => AttrKind::If,
            "data-else" => AttrKind::Else,
            "data-for" => AttrKind::For,
            "data-model" => AttrKind::Model,
            _ => {
                if let Some(prop) = name.strip_prefix("data-bind:") {
                    AttrKind::Bind(prop.to_string())
                } else if let Some(child) = name.strip_prefix("data-state:") {
                    AttrKind::State(child.to_string())
                } else if let Some(event) = name.strip_prefix("on").filter(|e| !e.is_empty()) {
                    AttrKind::On(event.to_ascii_lowercase())
                } else {
                    AttrKind::Static
                }
            }
        }
    }

    pub fn is_directive(&self) -> bool {
        !matches!(self, AttrKind::Static)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAttr {
    pub name: String,
    pub value: Option<String>,
    pub kind: AttrKind,
}

impl TemplateAttr {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        let name = name.into();
        let kind = AttrKind::classify(&name);
        Self { name, value, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element {
        tag: String,
        attrs: Vec<TemplateAttr>,
        children: Vec<Node>,
        self_closing: bool,
    },
    Text(String),
}

impl Node {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            Node::Text(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&TemplateAttr> {
        match self {
            Node::Element { attrs, .. } => attrs.iter().find(|a| a.name == name),
            Node::Text(_) => None,
        }
    }

    /// Number of directive attributes in this subtree.
    pub fn directive_count(&self) -> usize {
        match self {
            Node::Element {
                attrs, children, ..
            } => {
                attrs.iter().filter(|a| a.kind.is_directive()).count()
                    + children.iter().map(Node::directive_count).sum::<usize>()
            }
            Node::Text(_) => 0,
        }
    }
}
