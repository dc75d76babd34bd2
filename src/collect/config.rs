//! Configuration for the two section-extraction modes: a static
//! selector-per-section dichotomy, or an interactive click-through tablist.

/// How to locate the sections a listing page's links live in.
#[derive(Debug, Clone)]
pub enum SectionStrategy {
    /// A single locator whose matches are themselves the sections.
    Static { sections_selector: String },
    /// Iterate a tablist: click each tab, the panel that becomes visible is
    /// the section.
    ClickThrough {
        tablist_selector: String,
        tab_selector: String,
        panel_selector: String,
    },
}

#[derive(Debug, Clone)]
pub struct LinkCollectorConfig {
    pub start_url: String,
    pub strategy: SectionStrategy,
    /// Selector for a link's name, relative to the link element. `None` falls
    /// back to the link's first non-empty text node.
    pub name_selector: Option<String>,
    /// Selector for a link's block-count text, relative to the link element.
    /// `None` means no count is extracted.
    pub count_selector: Option<String>,
}

impl LinkCollectorConfig {
    #[must_use]
    pub fn static_sections(
        start_url: impl Into<String>,
        sections_selector: impl Into<String>,
    ) -> Self {
        Self {
            start_url: start_url.into(),
            strategy: SectionStrategy::Static {
                sections_selector: sections_selector.into(),
            },
            name_selector: None,
            count_selector: None,
        }
    }

    #[must_use]
    pub fn with_name_selector(mut self, selector: impl Into<String>) -> Self {
        self.name_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn with_count_selector(mut self, selector: impl Into<String>) -> Self {
        self.count_selector = Some(selector.into());
        self
    }
}
