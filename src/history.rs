use crate::filter::FilterState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new("")
    }
}

impl NavigationHistory {
    pub fn new(initial: &str) -> Self {
        Self {
            entries: vec![normalize_fragment(initial)],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &str {
        &self.entries[self.cursor]
    }

    pub fn current_filter(&self) -> FilterState {
        FilterState::from_fragment(self.current())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn push(&mut self, fragment: &str) -> bool {
        let fragment = normalize_fragment(fragment);
        if fragment == self.current() {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        log::info!("history.push fragment={}", fragment);
        self.entries.push(fragment);
        self.cursor = self.entries.len() - 1;
        true
    }

    pub fn back(&mut self) -> Option<&str> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<&str> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }
}

fn normalize_fragment(raw: &str) -> String {
    let body = raw
        .trim()
        .trim_start_matches('#')
        .trim_start_matches('!')
        .trim_start_matches('?');
    if body.is_empty() {
        String::new()
    } else {
        format!("#{body}")
    }
}
