//! In-memory native binding.
//!
//! A complete [`NativeBinding`] over an in-process inode tree, used by the
//! test suites and for local development without a cluster. It doubles as a
//! spy: every trait call is appended to a recorded-call log, so tests can
//! assert that argument validation short-circuits before the boundary.
//!
//! Directory reads are stateful per descriptor, exactly like the real SDK:
//! successive `readdir` calls on one descriptor walk the directory in
//! batches until exhaustion.

use crate::binding::{NativeBinding, RawDirent, StatRecord};
use crate::status::{STATUS_EXISTS, STATUS_NOT_FOUND};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

const STATUS_BADF: i32 = -(libc::EBADF as i32);
const STATUS_NOT_DIR: i32 = -(libc::ENOTDIR as i32);
const STATUS_IS_DIR: i32 = -(libc::EISDIR as i32);
const STATUS_NOT_EMPTY: i32 = -(libc::ENOTEMPTY as i32);

const ROOT_INO: u64 = 1;

#[derive(Debug, Clone)]
enum NodeKind {
    File { data: Vec<u8> },
    Dir { children: BTreeMap<String, u64> },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: u64,
    mtime: u64,
    ctime: u64,
    atime_nsec: u32,
    mtime_nsec: u32,
    ctime_nsec: u32,
}

impl Node {
    fn dir(mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            kind: NodeKind::Dir {
                children: BTreeMap::new(),
            },
            mode: libc::S_IFDIR as u32 | (mode & 0o7777),
            uid,
            gid,
            atime: 0,
            mtime: 0,
            ctime: 0,
            atime_nsec: 0,
            mtime_nsec: 0,
            ctime_nsec: 0,
        }
    }

    fn file(mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            kind: NodeKind::File { data: Vec::new() },
            mode: libc::S_IFREG as u32 | (mode & 0o7777),
            uid,
            gid,
            atime: 0,
            mtime: 0,
            ctime: 0,
            atime_nsec: 0,
            mtime_nsec: 0,
            ctime_nsec: 0,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. })
    }
}

struct Fd {
    ino: u64,
    dir_cursor: usize,
}

struct State {
    nodes: HashMap<u64, Node>,
    next_ino: u64,
    fds: HashMap<i32, Fd>,
    next_fd: i32,
    next_client: i64,
    started: bool,
    config: HashMap<String, String>,
    resolve_misses: HashSet<u64>,
}

impl State {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INO, Node::dir(0o755, 0, 0));
        Self {
            nodes,
            next_ino: ROOT_INO + 1,
            fds: HashMap::new(),
            next_fd: 3,
            next_client: 1,
            started: false,
            config: HashMap::new(),
            resolve_misses: HashSet::new(),
        }
    }

    fn components(path: &str) -> Vec<&str> {
        path.split('/').filter(|c| !c.is_empty()).collect()
    }

    fn lookup(&self, path: &str) -> Option<u64> {
        let mut ino = ROOT_INO;
        for comp in Self::components(path) {
            let node = self.nodes.get(&ino)?;
            match &node.kind {
                NodeKind::Dir { children } => ino = *children.get(comp)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some(ino)
    }

    /// Parent directory inode and leaf name, if all intermediate
    /// components resolve to directories.
    fn lookup_parent<'p>(&self, path: &'p str) -> Option<(u64, &'p str)> {
        let comps = Self::components(path);
        let (leaf, dirs) = comps.split_last()?;
        let mut ino = ROOT_INO;
        for comp in dirs {
            let node = self.nodes.get(&ino)?;
            match &node.kind {
                NodeKind::Dir { children } => ino = *children.get(*comp)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some((ino, leaf))
    }

    fn insert_child(&mut self, parent: u64, name: &str, node: Node) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.nodes.insert(ino, node);
        if let Some(Node {
            kind: NodeKind::Dir { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.insert(name.to_string(), ino);
        }
        ino
    }

    fn remove_subtree(&mut self, ino: u64) {
        if let Some(node) = self.nodes.remove(&ino) {
            if let NodeKind::Dir { children } = node.kind {
                for child in children.into_values() {
                    self.remove_subtree(child);
                }
            }
        }
    }

    fn record_for(&self, ino: u64) -> Option<StatRecord> {
        let node = self.nodes.get(&ino)?;
        let size = match &node.kind {
            NodeKind::File { data } => data.len() as u64,
            NodeKind::Dir { .. } => 0,
        };
        Some(StatRecord {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
            atime_nsec: node.atime_nsec,
            mtime_nsec: node.mtime_nsec,
            ctime_nsec: node.ctime_nsec,
            mode: node.mode,
            nlink: 1,
            blk_size: 4096,
            uid: node.uid,
            gid: node.gid,
        })
    }
}

pub struct MemBinding {
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
}

impl MemBinding {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Every native call recorded since construction or the last
    /// [`clear_calls`](Self::clear_calls), as `"name:target"` strings.
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make `batch_get_attrs` skip this inode, simulating an entry deleted
    /// between the enumerate and resolve phases of a listing.
    pub fn inject_resolve_miss(&self, ino: u64) {
        self.state.lock().unwrap().resolve_misses.insert(ino);
    }

    /// Inode id for a path, bypassing the call log. Test setup helper.
    pub fn ino_of(&self, path: &str) -> Option<u64> {
        self.state.lock().unwrap().lookup(path)
    }

    /// Last value pushed for a configuration key, for assertions.
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().config.get(key).cloned()
    }

    /// Whether the simulated client has been started and not yet released.
    pub fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }

    /// Create a directory tree entry directly, bypassing the call log.
    pub fn seed_dir(&self, path: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        let mut ino = ROOT_INO;
        let comps: Vec<String> = State::components(path)
            .into_iter()
            .map(str::to_string)
            .collect();
        for comp in comps {
            let existing = match &state.nodes[&ino].kind {
                NodeKind::Dir { children } => children.get(&comp).copied(),
                NodeKind::File { .. } => None,
            };
            ino = match existing {
                Some(child) => child,
                None => state.insert_child(ino, &comp, Node::dir(0o755, 0, 0)),
            };
        }
        ino
    }

    /// Create a file with contents directly, bypassing the call log.
    pub fn seed_file(&self, path: &str, data: &[u8]) -> u64 {
        let dir = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        self.seed_dir(&dir);
        let mut state = self.state.lock().unwrap();
        let (parent, leaf) = state.lookup_parent(path).expect("seed_file parent");
        let leaf = leaf.to_string();
        let mut node = Node::file(0o644, 0, 0);
        node.kind = NodeKind::File {
            data: data.to_vec(),
        };
        state.insert_child(parent, &leaf, node)
    }

    /// Raw file contents, for assertions. Test helper.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let ino = state.lookup(path)?;
        match &state.nodes.get(&ino)?.kind {
            NodeKind::File { data } => Some(data.clone()),
            NodeKind::Dir { .. } => None,
        }
    }

    /// Mode bits of a node, for assertions. Test helper.
    pub fn mode_of(&self, path: &str) -> Option<u32> {
        let state = self.state.lock().unwrap();
        let ino = state.lookup(path)?;
        state.nodes.get(&ino).map(|n| n.mode)
    }

    /// Owner of a node, for assertions. Test helper.
    pub fn owner_of(&self, path: &str) -> Option<(u32, u32)> {
        let state = self.state.lock().unwrap();
        let ino = state.lookup(path)?;
        state.nodes.get(&ino).map(|n| (n.uid, n.gid))
    }
}

impl Default for MemBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBinding for MemBinding {
    fn new_client(&self) -> i64 {
        self.record("new_client".to_string());
        let mut state = self.state.lock().unwrap();
        let id = state.next_client;
        state.next_client += 1;
        id
    }

    fn set_client(&self, _id: i64, key: &str, value: &str) -> i32 {
        self.record(format!("set_client:{key}"));
        self.state
            .lock()
            .unwrap()
            .config
            .insert(key.to_string(), value.to_string());
        0
    }

    fn start_client(&self, _id: i64) -> i32 {
        self.record("start_client".to_string());
        self.state.lock().unwrap().started = true;
        0
    }

    fn chdir(&self, _id: i64, path: &str) -> i32 {
        self.record(format!("chdir:{path}"));
        let state = self.state.lock().unwrap();
        match state.lookup(path) {
            Some(ino) if state.nodes[&ino].is_dir() => 0,
            Some(_) => STATUS_NOT_DIR,
            None => STATUS_NOT_FOUND as i32,
        }
    }

    fn open(&self, _id: i64, path: &str, flags: i32, mode: u32, uid: u32, gid: u32) -> i32 {
        self.record(format!("open:{path}"));
        let mut state = self.state.lock().unwrap();
        let ino = match state.lookup(path) {
            Some(ino) => {
                if flags & crate::flags::O_TRUNC != 0 {
                    if let Some(Node {
                        kind: NodeKind::File { data },
                        ..
                    }) = state.nodes.get_mut(&ino)
                    {
                        data.clear();
                    }
                }
                ino
            }
            None => {
                if flags & crate::flags::O_CREAT == 0 {
                    return STATUS_NOT_FOUND as i32;
                }
                let (parent, leaf) = match state.lookup_parent(path) {
                    Some(pair) => pair,
                    None => return STATUS_NOT_FOUND as i32,
                };
                if !state.nodes[&parent].is_dir() {
                    return STATUS_NOT_DIR;
                }
                let leaf = leaf.to_string();
                state.insert_child(parent, &leaf, Node::file(mode, uid, gid))
            }
        };
        let fd = state.next_fd;
        state.next_fd += 1;
        state.fds.insert(fd, Fd { ino, dir_cursor: 0 });
        fd
    }

    fn close(&self, _id: i64, fd: i32) {
        self.record(format!("close:{fd}"));
        self.state.lock().unwrap().fds.remove(&fd);
    }

    fn flush(&self, _id: i64, fd: i32) -> i32 {
        self.record(format!("flush:{fd}"));
        if self.state.lock().unwrap().fds.contains_key(&fd) {
            0
        } else {
            STATUS_BADF
        }
    }

    fn read(&self, _id: i64, fd: i32, buf: &mut [u8], offset: u64) -> i64 {
        self.record(format!("read:{fd}"));
        let state = self.state.lock().unwrap();
        let Some(entry) = state.fds.get(&fd) else {
            return STATUS_BADF as i64;
        };
        match &state.nodes[&entry.ino].kind {
            NodeKind::File { data } => {
                let offset = offset as usize;
                if offset >= data.len() {
                    return 0;
                }
                let n = buf.len().min(data.len() - offset);
                buf[..n].copy_from_slice(&data[offset..offset + n]);
                n as i64
            }
            NodeKind::Dir { .. } => STATUS_IS_DIR as i64,
        }
    }

    fn write(&self, _id: i64, fd: i32, buf: &[u8], offset: u64) -> i64 {
        self.record(format!("write:{fd}"));
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.fds.get(&fd) else {
            return STATUS_BADF as i64;
        };
        let ino = entry.ino;
        match &mut state.nodes.get_mut(&ino).unwrap().kind {
            NodeKind::File { data } => {
                let offset = offset as usize;
                let end = offset + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset..end].copy_from_slice(buf);
                buf.len() as i64
            }
            NodeKind::Dir { .. } => STATUS_IS_DIR as i64,
        }
    }

    fn file_size(&self, _id: i64, fd: i32) -> i64 {
        self.record(format!("file_size:{fd}"));
        let state = self.state.lock().unwrap();
        let Some(entry) = state.fds.get(&fd) else {
            return STATUS_BADF as i64;
        };
        match &state.nodes[&entry.ino].kind {
            NodeKind::File { data } => data.len() as i64,
            NodeKind::Dir { .. } => 0,
        }
    }

    fn mkdirs(&self, _id: i64, path: &str, mode: u32, uid: u32, gid: u32) -> i32 {
        self.record(format!("mkdirs:{path}"));
        let mut state = self.state.lock().unwrap();
        if state.lookup(path).is_some() {
            return STATUS_EXISTS as i32;
        }
        let mut ino = ROOT_INO;
        let comps: Vec<String> = State::components(path)
            .into_iter()
            .map(str::to_string)
            .collect();
        for comp in comps {
            let next = match &state.nodes[&ino].kind {
                NodeKind::Dir { children } => children.get(&comp).copied(),
                NodeKind::File { .. } => return STATUS_NOT_DIR,
            };
            ino = match next {
                Some(child) => child,
                None => state.insert_child(ino, &comp, Node::dir(mode, uid, gid)),
            };
        }
        0
    }

    fn rmdir(&self, _id: i64, path: &str, recursive: bool) -> i32 {
        self.record(format!("rmdir:{path}"));
        let mut state = self.state.lock().unwrap();
        let Some((parent, leaf)) = state.lookup_parent(path) else {
            return STATUS_NOT_FOUND as i32;
        };
        let leaf = leaf.to_string();
        let Some(ino) = state.lookup(path) else {
            return STATUS_NOT_FOUND as i32;
        };
        match &state.nodes[&ino].kind {
            NodeKind::Dir { children } => {
                if !children.is_empty() && !recursive {
                    return STATUS_NOT_EMPTY;
                }
            }
            NodeKind::File { .. } => return STATUS_NOT_DIR,
        }
        if let Some(Node {
            kind: NodeKind::Dir { children },
            ..
        }) = state.nodes.get_mut(&parent)
        {
            children.remove(&leaf);
        }
        state.remove_subtree(ino);
        0
    }

    fn unlink(&self, _id: i64, path: &str) -> i32 {
        self.record(format!("unlink:{path}"));
        let mut state = self.state.lock().unwrap();
        let Some(ino) = state.lookup(path) else {
            return STATUS_NOT_FOUND as i32;
        };
        if state.nodes[&ino].is_dir() {
            return STATUS_IS_DIR;
        }
        let (parent, leaf) = state.lookup_parent(path).expect("parent of linked file");
        let leaf = leaf.to_string();
        if let Some(Node {
            kind: NodeKind::Dir { children },
            ..
        }) = state.nodes.get_mut(&parent)
        {
            children.remove(&leaf);
        }
        state.nodes.remove(&ino);
        0
    }

    fn rename(&self, _id: i64, from: &str, to: &str) -> i32 {
        self.record(format!("rename:{from}->{to}"));
        let mut state = self.state.lock().unwrap();
        let Some(ino) = state.lookup(from) else {
            return STATUS_NOT_FOUND as i32;
        };
        if state.lookup(to).is_some() {
            return STATUS_EXISTS as i32;
        }
        let Some((to_parent, to_leaf)) = state.lookup_parent(to) else {
            return STATUS_NOT_FOUND as i32;
        };
        let to_leaf = to_leaf.to_string();
        let (from_parent, from_leaf) = state.lookup_parent(from).expect("parent of source");
        let from_leaf = from_leaf.to_string();
        if let Some(Node {
            kind: NodeKind::Dir { children },
            ..
        }) = state.nodes.get_mut(&from_parent)
        {
            children.remove(&from_leaf);
        }
        if let Some(Node {
            kind: NodeKind::Dir { children },
            ..
        }) = state.nodes.get_mut(&to_parent)
        {
            children.insert(to_leaf, ino);
        }
        0
    }

    fn getattr(&self, _id: i64, path: &str, out: &mut StatRecord) -> i32 {
        self.record(format!("getattr:{path}"));
        let state = self.state.lock().unwrap();
        let Some(ino) = state.lookup(path) else {
            return STATUS_NOT_FOUND as i32;
        };
        *out = state.record_for(ino).expect("looked-up inode");
        0
    }

    fn setattr(&self, _id: i64, path: &str, record: &StatRecord, mask: u32) -> i32 {
        self.record(format!("setattr:{path}:mask={mask}"));
        let mut state = self.state.lock().unwrap();
        let Some(ino) = state.lookup(path) else {
            return STATUS_NOT_FOUND as i32;
        };
        let node = state.nodes.get_mut(&ino).expect("looked-up inode");
        if mask & crate::attr::ATTR_MODE != 0 {
            node.mode = (node.mode & libc::S_IFMT as u32) | (record.mode & 0o7777);
        }
        if mask & crate::attr::ATTR_UID != 0 {
            node.uid = record.uid;
        }
        if mask & crate::attr::ATTR_GID != 0 {
            node.gid = record.gid;
        }
        if mask & crate::attr::ATTR_MTIME != 0 {
            node.mtime = record.mtime;
            node.mtime_nsec = record.mtime_nsec;
        }
        if mask & crate::attr::ATTR_ATIME != 0 {
            node.atime = record.atime;
            node.atime_nsec = record.atime_nsec;
        }
        if mask & crate::attr::ATTR_SIZE != 0 {
            if let NodeKind::File { data } = &mut node.kind {
                data.resize(record.size as usize, 0);
            }
        }
        0
    }

    fn readdir(&self, _id: i64, fd: i32, out: &mut [RawDirent]) -> i32 {
        self.record(format!("readdir:{fd}"));
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.fds.get(&fd) else {
            return STATUS_BADF;
        };
        let ino = entry.ino;
        let cursor = entry.dir_cursor;
        let names: Vec<(String, u64)> = match &state.nodes[&ino].kind {
            NodeKind::Dir { children } => children
                .iter()
                .map(|(name, child)| (name.clone(), *child))
                .collect(),
            NodeKind::File { .. } => return STATUS_NOT_DIR,
        };
        let mut filled = 0;
        for (name, child) in names.iter().skip(cursor).take(out.len()) {
            let mut dent = RawDirent::default();
            dent.ino = *child;
            let bytes = name.as_bytes();
            let len = bytes.len().min(dent.name.len());
            dent.name[..len].copy_from_slice(&bytes[..len]);
            dent.name_len = len as u32;
            dent.d_type = if state.nodes[child].is_dir() {
                libc::DT_DIR
            } else {
                libc::DT_REG
            };
            out[filled] = dent;
            filled += 1;
        }
        state.fds.get_mut(&fd).expect("checked fd").dir_cursor = cursor + filled;
        filled as i32
    }

    fn batch_get_attrs(&self, _id: i64, fd: i32, inos: &[u64], out: &mut [StatRecord]) -> i32 {
        self.record(format!("batch_get_attrs:{fd}:n={}", inos.len()));
        let state = self.state.lock().unwrap();
        if !state.fds.contains_key(&fd) {
            return STATUS_BADF;
        }
        let mut filled = 0;
        for ino in inos {
            if filled >= out.len() {
                break;
            }
            if state.resolve_misses.contains(ino) {
                continue;
            }
            if let Some(rec) = state.record_for(*ino) {
                out[filled] = rec;
                filled += 1;
            }
        }
        filled as i32
    }

    fn close_client(&self, _id: i64) {
        self.record("close_client".to_string());
        let mut state = self.state.lock().unwrap();
        state.started = false;
        state.fds.clear();
    }
}
