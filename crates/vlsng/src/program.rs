//! The graph runtime: the symbol table of nodes and groups, the connection
//! model, block-synchronous execution, directives, and sub-graph records.
//!
//! A [`Program`] owns its nodes outright; edges are `(node name, port index)`
//! pairs stored on the destination slot, never pointers between nodes. Each
//! tick evaluates every node once in table insertion order, which is the
//! canonical order the language guarantees. Cycles are legal and resolve
//! through nodes with intrinsic one-block delay.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    SAMPLE_RATE, TAU,
    error::{Error, RunResult},
    io,
    objects::{self, AudioObject, Block, BlockIo, NodeSpec, SILENT_BLOCK, SubgraphObject, UserObject},
    parse::Parser,
    value::{Number, Value},
};

/// Signature of a directive callback: raw argument tokens plus the program
/// being parsed.
pub type DirectiveCallback = dyn Fn(&[String], &mut Program) -> RunResult<()> + Send + Sync;

static GLOBAL_DIRECTIVES: OnceLock<Mutex<AHashMap<String, Arc<DirectiveCallback>>>> = OnceLock::new();

fn global_directives() -> &'static Mutex<AHashMap<String, Arc<DirectiveCallback>>> {
    GLOBAL_DIRECTIVES.get_or_init(|| Mutex::new(AHashMap::new()))
}

/// Registers a directive at process scope, available to every program that
/// does not shadow the name with its own registration.
pub fn add_global_directive(
    name: impl Into<String>,
    callback: impl Fn(&[String], &mut Program) -> RunResult<()> + Send + Sync + 'static,
) {
    global_directives()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.into(), Arc::new(callback));
}

/// The cardinality of a connection statement, derived from whether each
/// endpoint names a node or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    /// Parallel group-to-group wiring; sizes must match.
    ManyToMany,
    /// Full cross wiring between two groups (the `*>` arrow).
    Biclique,
    /// Chains a group's members sequentially.
    Series,
}

/// A stored sub-graph: verbatim source plus declared I/O arity.
#[derive(Debug, Clone)]
pub(crate) struct SubgraphDef {
    pub source: String,
    pub inputs: usize,
    pub outputs: usize,
}

/// Snapshot of a parent chain, taken when a child program is created.
///
/// Carries exactly what the two sanctioned uses need: the transitive node
/// count for `count_nodes` and the flattened sub-graph table for recursive
/// lookup (inner definitions shadow outer ones).
#[derive(Debug, Clone, Default)]
pub(crate) struct Ancestry {
    pub node_count: usize,
    pub subgraphs: AHashMap<String, SubgraphDef>,
}

#[derive(Debug, Clone)]
struct Edge {
    dest_port: usize,
    source: String,
    source_port: usize,
}

struct NodeSlot {
    object: Box<dyn AudioObject>,
    in_blocks: Vec<Block>,
    out_blocks: Vec<Block>,
    connected: Vec<bool>,
    incoming: SmallVec<[Edge; 2]>,
}

impl NodeSlot {
    fn new(spec: NodeSpec) -> Self {
        Self {
            object: spec.object,
            in_blocks: vec![SILENT_BLOCK; spec.inputs],
            out_blocks: vec![SILENT_BLOCK; spec.outputs],
            connected: vec![false; spec.inputs],
            incoming: SmallVec::new(),
        }
    }
}

/// A compiled signal-processing graph plus the tables behind it.
pub struct Program {
    table: IndexMap<String, NodeSlot>,
    group_sizes: AHashMap<String, usize>,
    symbol_table: IndexMap<String, Value>,
    subgraphs: AHashMap<String, SubgraphDef>,
    directives: AHashMap<String, Arc<DirectiveCallback>>,
    inputs: usize,
    outputs: usize,
    ancestry: Option<Ancestry>,
    library_path: Option<PathBuf>,
    run_length: Option<u64>,
    inline_counter: usize,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        let mut program = Self {
            table: IndexMap::new(),
            group_sizes: AHashMap::new(),
            symbol_table: IndexMap::new(),
            subgraphs: AHashMap::new(),
            directives: AHashMap::new(),
            inputs: 0,
            outputs: 0,
            ancestry: None,
            library_path: None,
            run_length: None,
            inline_counter: 0,
        };
        program.install_builtin_directives();
        program.seed_default_symbols();
        program
    }

    fn seed_default_symbols(&mut self) {
        self.symbol_table
            .insert("sf".to_owned(), Value::Number(Number::from(SAMPLE_RATE)));
        self.symbol_table
            .insert("tau".to_owned(), Value::Number(Number::from(TAU)));
    }

    fn install_builtin_directives(&mut self) {
        self.directives.insert(
            "length".to_owned(),
            Arc::new(|arguments: &[String], program: &mut Self| {
                let Some(argument) = arguments.first() else {
                    return Err(Error::semantic("The 'length' directive expects a sample count"));
                };
                let samples: f32 = argument
                    .parse()
                    .map_err(|_| Error::semantic(format!("Invalid sample count '{argument}'")))?;
                program.run_length = Some(samples.max(0.0) as u64);
                Ok(())
            }),
        );
    }

    // --- host API ---

    /// Sets the I/O widths and re-creates the `input`/`output` conduits.
    pub fn configure_io(&mut self, inputs: usize, outputs: usize) {
        self.inputs = inputs;
        self.outputs = outputs;
        self.table.shift_remove("input");
        self.table.shift_remove("output");
        self.create_io_nodes();
    }

    fn create_io_nodes(&mut self) {
        if self.inputs > 0 {
            self.table
                .insert("input".to_owned(), NodeSlot::new(objects::input_conduit(self.inputs)));
        }
        if self.outputs > 0 {
            self.table
                .insert("output".to_owned(), NodeSlot::new(objects::output_conduit(self.outputs)));
        }
    }

    /// Parses source into this program, additively: repeated calls keep
    /// extending the same graph. Call [`reset`](Self::reset) first for a
    /// replacement. Errors are reported to the log sink and returned.
    pub fn parse(&mut self, source: &str) -> RunResult<()> {
        let result = Parser::new(source, self).parse_program();
        if let Err(error) = &result {
            io::log(&error.to_string());
        }
        result
    }

    /// Advances the graph by one tick.
    ///
    /// `input` supplies one block per configured input channel; missing
    /// channels read as silence. Returns one block per output channel.
    pub fn run(&mut self, input: &[Block]) -> Vec<Block> {
        if self.inputs > 0 {
            if let Some(slot) = self.table.get_mut("input") {
                for (channel, block) in slot.out_blocks.iter_mut().enumerate() {
                    *block = input.get(channel).copied().unwrap_or(SILENT_BLOCK);
                }
            }
        }

        self.simulate();

        let mut output = vec![SILENT_BLOCK; self.outputs];
        if let Some(slot) = self.table.get("output") {
            for edge in &slot.incoming {
                let Some(source) = self.table.get(&edge.source) else {
                    continue;
                };
                let Some(block) = source.out_blocks.get(edge.source_port) else {
                    continue;
                };
                if let Some(dest) = output.get_mut(edge.dest_port) {
                    for (sample, incoming) in dest.iter_mut().zip(block.iter()) {
                        *sample += *incoming;
                    }
                }
            }
        }
        output
    }

    /// Evaluates every node once, in table insertion order. Input ports
    /// aggregate incoming edges by summation; a source later in the order
    /// contributes its previous tick's block, which is what makes feedback
    /// through delaying nodes well-defined.
    fn simulate(&mut self) {
        for index in 0..self.table.len() {
            let mut in_blocks = match self.table.get_index_mut(index) {
                Some((_, slot)) => std::mem::take(&mut slot.in_blocks),
                None => continue,
            };
            for block in &mut in_blocks {
                *block = SILENT_BLOCK;
            }

            if let Some((_, slot)) = self.table.get_index(index) {
                for edge in &slot.incoming {
                    let Some(source) = self.table.get(&edge.source) else {
                        continue;
                    };
                    let Some(block) = source.out_blocks.get(edge.source_port) else {
                        continue;
                    };
                    if let Some(dest) = in_blocks.get_mut(edge.dest_port) {
                        for (sample, incoming) in dest.iter_mut().zip(block.iter()) {
                            *sample += *incoming;
                        }
                    }
                }
            }

            if let Some((_, slot)) = self.table.get_index_mut(index) {
                slot.in_blocks = in_blocks;
                let mut block_io = BlockIo::new(&slot.in_blocks, &mut slot.out_blocks, &slot.connected);
                slot.object.process(&mut block_io);
            }
        }
    }

    /// Notifies every node that the stream has ended.
    pub fn finish(&mut self) {
        for slot in self.table.values_mut() {
            slot.object.finish();
        }
    }

    /// Drops all nodes, groups, symbols, and sub-graphs, then re-creates the
    /// `input`/`output` conduits per the current I/O configuration and
    /// re-seeds the `sf`/`tau` symbols.
    pub fn reset(&mut self) {
        self.table.clear();
        self.group_sizes.clear();
        self.symbol_table.clear();
        self.subgraphs.clear();
        self.inline_counter = 0;
        self.create_io_nodes();
        self.seed_default_symbols();
    }

    /// Installs a directive at program scope, shadowing any process-scope
    /// registration of the same name.
    pub fn add_directive(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn(&[String], &mut Self) -> RunResult<()> + Send + Sync + 'static,
    ) {
        self.directives.insert(name.into(), Arc::new(callback));
    }

    pub(crate) fn invoke_directive(&mut self, name: &str, arguments: &[String]) -> RunResult<()> {
        let callback = self.directives.get(name).cloned().or_else(|| {
            global_directives()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned()
        });
        let Some(callback) = callback else {
            return Err(Error::semantic(format!("Unknown directive '{name}'")));
        };
        callback(arguments, self)
    }

    /// Installs a node backed by a host callback.
    pub fn add_user_object(
        &mut self,
        name: &str,
        inputs: usize,
        outputs: usize,
        callback: impl FnMut(&[Block], &mut [Block]) + Send + 'static,
    ) -> RunResult<()> {
        self.check_name_free(name)?;
        self.table
            .insert(name.to_owned(), NodeSlot::new(UserObject::build(inputs, outputs, callback)));
        Ok(())
    }

    /// The run length requested by the `length` directive, in samples.
    #[must_use]
    pub fn requested_length(&self) -> Option<u64> {
        self.run_length
    }

    /// Sets the directory searched first by `import_library`.
    pub fn set_library_path(&mut self, path: impl Into<PathBuf>) {
        self.library_path = Some(path.into());
    }

    #[must_use]
    pub(crate) fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    // --- names, symbols, and introspection ---

    #[must_use]
    pub fn object_exists(&self, name: &str) -> bool {
        self.table.contains_key(name) || self.group_sizes.contains_key(name)
    }

    #[must_use]
    pub fn symbol_exists(&self, name: &str) -> bool {
        self.symbol_table.contains_key(name)
    }

    #[must_use]
    pub(crate) fn is_group(&self, name: &str) -> bool {
        self.group_sizes.contains_key(name)
    }

    /// Size of a declared group.
    #[must_use]
    pub fn group_size(&self, name: &str) -> Option<usize> {
        self.group_sizes.get(name).copied()
    }

    /// Number of nodes in this program alone.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.table.len()
    }

    /// Number of nodes in this program and all of its ancestors.
    #[must_use]
    pub fn count_nodes(&self) -> usize {
        self.table.len() + self.ancestry.as_ref().map_or(0, |ancestry| ancestry.node_count)
    }

    fn check_name_free(&self, name: &str) -> RunResult<()> {
        if self.object_exists(name) || self.symbol_exists(name) {
            return Err(Error::semantic(format!("Symbol '{name}' is already in use")));
        }
        Ok(())
    }

    /// Binds a symbol; node, group, and symbol names share one namespace.
    pub fn add_symbol(&mut self, name: &str, value: Value) -> RunResult<()> {
        self.check_name_free(name)?;
        self.symbol_table.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn remove_symbol(&mut self, name: &str) {
        self.symbol_table.shift_remove(name);
    }

    #[must_use]
    pub fn get_symbol(&self, name: &str) -> Option<&Value> {
        self.symbol_table.get(name)
    }

    // --- node and group construction ---

    /// Creates a node of the named type. Unknown standard types fall back to
    /// the sub-graph table (this program's own, then its ancestors').
    pub fn create_object(&mut self, name: &str, type_name: &str, args: &[Value]) -> RunResult<()> {
        self.check_name_free(name)?;
        let spec = match objects::create_standard_object(type_name, args)? {
            Some(spec) => spec,
            None => {
                let Some(definition) = self.find_subgraph(type_name) else {
                    return Err(Error::semantic(format!("No such object type: {type_name}")));
                };
                SubgraphObject::build(&definition, self.ancestry_snapshot())?
            }
        };
        self.table.insert(name.to_owned(), NodeSlot::new(spec));
        Ok(())
    }

    /// Creates `count` homogeneous nodes under the `__grp_<name><i>` scheme
    /// and records the group size. The group name itself is not a node.
    pub fn create_group(&mut self, name: &str, type_name: &str, args: &[Value], count: usize) -> RunResult<()> {
        if count == 0 {
            return Err(Error::semantic(format!("Group '{name}' must have at least one member")));
        }
        self.check_name_free(name)?;
        for member in 0..count {
            self.create_object(&Self::member_name(name, member), type_name, args)?;
        }
        self.group_sizes.insert(name.to_owned(), count);
        Ok(())
    }

    fn member_name(group: &str, index: usize) -> String {
        format!("__grp_{group}{index}")
    }

    pub(crate) fn next_inline_name(&mut self) -> String {
        let name = format!("inline_object{}", self.inline_counter);
        self.inline_counter += 1;
        name
    }

    // --- connections ---

    fn expect_object(&self, name: &str) -> RunResult<()> {
        if self.group_sizes.contains_key(name) {
            return Err(Error::semantic(format!("'{name}' is a group, not an object")));
        }
        if !self.table.contains_key(name) {
            return Err(Error::semantic(format!("Object '{name}' has not been declared")));
        }
        Ok(())
    }

    fn expect_group(&self, name: &str) -> RunResult<usize> {
        if self.table.contains_key(name) {
            return Err(Error::semantic(format!("'{name}' is an object, not a group")));
        }
        self.group_sizes
            .get(name)
            .copied()
            .ok_or_else(|| Error::semantic(format!("Group '{name}' has not been declared")))
    }

    fn check_io_and_connect(
        &mut self,
        output_object: &str,
        output_port: usize,
        input_object: &str,
        input_port: usize,
    ) -> RunResult<()> {
        let Some(output_slot) = self.table.get(output_object) else {
            return Err(Error::semantic(format!("Object '{output_object}' has not been declared")));
        };
        if output_slot.out_blocks.len() <= output_port {
            return Err(Error::type_error(format!(
                "Port index out of range on output object '{output_object}'. Index is: {output_port}"
            )));
        }
        let Some(input_slot) = self.table.get_mut(input_object) else {
            return Err(Error::semantic(format!("Object '{input_object}' has not been declared")));
        };
        if input_slot.in_blocks.len() <= input_port {
            return Err(Error::type_error(format!(
                "Port index out of range on input object '{input_object}'. Index is: {input_port}"
            )));
        }
        input_slot.incoming.push(Edge {
            dest_port: input_port,
            source: output_object.to_owned(),
            source_port: output_port,
        });
        input_slot.connected[input_port] = true;
        Ok(())
    }

    /// Expands one connection statement into edges according to its
    /// cardinality. For [`ConnectionKind::Series`] the output endpoint is
    /// ignored and members chain `out0 → in<input_port>`.
    pub fn connect_objects(
        &mut self,
        output_object: &str,
        output_port: usize,
        input_object: &str,
        input_port: usize,
        kind: ConnectionKind,
    ) -> RunResult<()> {
        match kind {
            ConnectionKind::OneToOne => {
                self.expect_object(output_object)?;
                self.expect_object(input_object)?;
                self.check_io_and_connect(output_object, output_port, input_object, input_port)
            }
            ConnectionKind::ManyToOne => {
                let size = self.expect_group(output_object)?;
                self.expect_object(input_object)?;
                for member in 0..size {
                    self.check_io_and_connect(
                        &Self::member_name(output_object, member),
                        output_port,
                        input_object,
                        input_port,
                    )?;
                }
                Ok(())
            }
            ConnectionKind::OneToMany => {
                self.expect_object(output_object)?;
                let size = self.expect_group(input_object)?;
                for member in 0..size {
                    self.check_io_and_connect(
                        output_object,
                        output_port,
                        &Self::member_name(input_object, member),
                        input_port,
                    )?;
                }
                Ok(())
            }
            ConnectionKind::ManyToMany => {
                let output_size = self.expect_group(output_object)?;
                let input_size = self.expect_group(input_object)?;
                if output_size != input_size {
                    return Err(Error::type_error(
                        "Group sizes to be connected in parallel are not identical",
                    ));
                }
                for member in 0..output_size {
                    self.check_io_and_connect(
                        &Self::member_name(output_object, member),
                        output_port,
                        &Self::member_name(input_object, member),
                        input_port,
                    )?;
                }
                Ok(())
            }
            ConnectionKind::Biclique => {
                let output_size = self.expect_group(output_object)?;
                let input_size = self.expect_group(input_object)?;
                for out_member in 0..output_size {
                    for in_member in 0..input_size {
                        self.check_io_and_connect(
                            &Self::member_name(output_object, out_member),
                            output_port,
                            &Self::member_name(input_object, in_member),
                            input_port,
                        )?;
                    }
                }
                Ok(())
            }
            ConnectionKind::Series => {
                let size = self.expect_group(input_object)?;
                for member in 0..size - 1 {
                    self.check_io_and_connect(
                        &Self::member_name(input_object, member),
                        0,
                        &Self::member_name(input_object, member + 1),
                        input_port,
                    )?;
                }
                Ok(())
            }
        }
    }

    // --- sub-graphs and ancestry ---

    pub(crate) fn add_subgraph(&mut self, name: &str, definition: SubgraphDef) -> RunResult<()> {
        if self.subgraphs.contains_key(name) {
            return Err(Error::semantic(format!("Sub-graph '{name}' is already defined")));
        }
        self.subgraphs.insert(name.to_owned(), definition);
        Ok(())
    }

    /// Looks a sub-graph up by type name, here first and then up the
    /// ancestry chain.
    pub(crate) fn find_subgraph(&self, name: &str) -> Option<SubgraphDef> {
        self.subgraphs.get(name).cloned().or_else(|| {
            self.ancestry
                .as_ref()
                .and_then(|ancestry| ancestry.subgraphs.get(name).cloned())
        })
    }

    pub(crate) fn set_ancestry(&mut self, ancestry: Ancestry) {
        self.ancestry = Some(ancestry);
    }

    /// The ancestry a child created right now should carry.
    pub(crate) fn ancestry_snapshot(&self) -> Ancestry {
        let mut subgraphs = self
            .ancestry
            .as_ref()
            .map(|ancestry| ancestry.subgraphs.clone())
            .unwrap_or_default();
        for (name, definition) in &self.subgraphs {
            subgraphs.insert(name.clone(), definition.clone());
        }
        Ancestry {
            node_count: self.count_nodes(),
            subgraphs,
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("nodes", &self.table.keys().collect::<Vec<_>>())
            .field("groups", &self.group_sizes)
            .field("symbols", &self.symbol_table.keys().collect::<Vec<_>>())
            .field("subgraphs", &self.subgraphs.keys().collect::<Vec<_>>())
            .field("io", &(self.inputs, self.outputs))
            .finish_non_exhaustive()
    }
}
