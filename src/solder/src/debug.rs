use crate::container::graph::Graph;
use crate::error::Error;

/// Receives the human-readable build log, one line per event, indented by
/// resolution depth. Callbacks are invoked synchronously and must not
/// re-enter the container.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink {
    fn line(&self, line: &str);
}

impl<F: Fn(&str)> LogSink for F {
    fn line(&self, line: &str) {
        self(line)
    }
}

/// Receives the dependency graph rendered as Graphviz DOT text once the
/// build finishes, successfully or not.
#[cfg_attr(test, mockall::automock)]
pub trait GraphSink {
    fn graph(&self, dot: &str);
}

impl<F: Fn(&str)> GraphSink for F {
    fn graph(&self, dot: &str) {
        self(dot)
    }
}

/// Debug sinks and hooks attached to one build.
#[derive(Default)]
pub struct DebugOptions {
    pub(crate) logger: Option<Box<dyn LogSink>>,
    pub(crate) visualizer: Option<Box<dyn GraphSink>>,
    pub(crate) on_success: Vec<Box<dyn FnOnce()>>,
    pub(crate) on_error: Vec<Box<dyn FnOnce(&Error)>>,
}

impl DebugOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logger(mut self, sink: impl LogSink + 'static) -> Self {
        self.logger = Some(Box::new(sink));
        self
    }

    /// Routes the build log to standard error.
    pub fn stderr_logger(self) -> Self {
        self.logger(|line: &str| eprintln!("{line}"))
    }

    pub fn visualizer(mut self, sink: impl GraphSink + 'static) -> Self {
        self.visualizer = Some(Box::new(sink));
        self
    }

    pub fn on_success(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_success.push(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(&Error) + 'static) -> Self {
        self.on_error.push(Box::new(hook));
        self
    }
}

/// Renders the build graph as DOT. Providers that ran are solid, failed
/// ones red, registered-but-unused ones dashed.
pub(crate) fn render_dot(graph: &Graph) -> String {
    let mut out = String::from("digraph dependencies {\n  node [shape=box];\n");
    for node in graph.nodes() {
        let attrs = if node.failed {
            "color=red"
        } else if node.used {
            "color=black"
        } else {
            "color=gray, style=dashed"
        };
        out.push_str(&format!("  \"{}\" [{}];\n", node.label, attrs));
    }
    for (from, to) in graph.edges() {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\";\n",
            graph.nodes()[*from].label,
            graph.nodes()[*to].label
        ));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_sink_mock_observes_the_rendered_graph() {
        let mut sink = MockGraphSink::new();
        sink.expect_graph()
            .withf(|dot| dot.starts_with("digraph"))
            .times(1)
            .return_const(());

        let mut graph = Graph::new();
        graph.ensure_node("app::one");
        sink.graph(&render_dot(&graph));
    }

    #[test]
    fn log_sink_mock_observes_lines() {
        let mut sink = MockLogSink::new();
        sink.expect_line()
            .withf(|line| line.contains("resolving"))
            .times(1)
            .return_const(());
        sink.line("resolving i32 for app::widen");
    }

    #[test]
    fn render_dot_marks_failed_nodes() {
        let mut graph = Graph::new();
        let a = graph.ensure_node("app::one");
        let b = graph.ensure_node("app::two");
        graph.add_edge(a, b);
        graph.mark_used(a);
        graph.mark_failed(b);

        let dot = render_dot(&graph);
        assert!(dot.contains("\"app::one\" [color=black];"));
        assert!(dot.contains("\"app::two\" [color=red];"));
        assert!(dot.contains("\"app::one\" -> \"app::two\";"));
    }

    #[test]
    fn log_sink_accepts_closures() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = {
            let lines = Rc::clone(&lines);
            move |line: &str| lines.borrow_mut().push(line.to_owned())
        };
        sink.line("resolving i32");
        assert_eq!(lines.borrow().as_slice(), ["resolving i32"]);
    }
}
