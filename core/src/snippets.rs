//! Built-in example programs offered by the example selector

/// Example sources, in selector order
pub const EXAMPLES: &[&str] = &[
    "let x = 5;\nprint(x + 2);",
    "let counter = 0;\ncounter = counter + 1;\nprint(counter);  \n",
];

pub fn get(index: usize) -> Option<&'static str> {
    EXAMPLES.get(index).copied()
}

/// Selector label for the example at `index` ("Example 1", "Example 2", ...)
pub fn label(index: usize) -> String {
    format!("Example {}", index + 1)
}

pub fn labels() -> Vec<String> {
    (0..EXAMPLES.len()).map(label).collect()
}
