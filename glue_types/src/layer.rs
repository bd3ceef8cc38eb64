use serde_derive::{Deserialize, Serialize};
use std::fmt;

/* Architectural rank of a namespace. Declaration order is the rank order, so the
   derived `Ord` gives `Core < Infra < Svc < Biz < App < Deploy`. */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Core,
    Infra,
    Svc,
    Biz,
    App,
    Deploy,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Core,
        Layer::Infra,
        Layer::Svc,
        Layer::Biz,
        Layer::App,
        Layer::Deploy,
    ];

    /// Lower-case name of the layer. The namespace carrying this name is the
    /// layer's root namespace.
    pub fn name(self) -> &'static str {
        match self {
            Layer::Core => "core",
            Layer::Infra => "infra",
            Layer::Svc => "svc",
            Layer::Biz => "biz",
            Layer::App => "app",
            Layer::Deploy => "deploy",
        }
    }

    /* Layers ranked strictly below this one, lowest first */
    pub fn below(self) -> impl Iterator<Item = Layer> {
        Layer::ALL.into_iter().filter(move |l| *l < self)
    }

    pub fn allows_services(self) -> bool {
        self >= Layer::Svc
    }

    pub fn allows_service_groups(self) -> bool {
        self == Layer::Deploy
    }

    pub fn from_name(name: &str) -> Option<Layer> {
        Layer::ALL.into_iter().find(|l| l.name() == name)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
