use crate::{arena::Handle, FastHashMap, FastHashSet};

pub type EntryPointIndex = u16;

/// Identifier for a named entity inside the module.
///
/// The namer assigns exactly one output name per key, so distinct entities
/// can never collide in the generated source.
#[derive(Debug, Eq, Hash, PartialEq)]
pub enum NameKey {
    Constant(Handle<crate::Constant>),
    GlobalVariable(Handle<crate::GlobalVariable>),
    Type(Handle<crate::Type>),
    StructMember(Handle<crate::Type>, u32),
    Function(Handle<crate::Function>),
    FunctionArgument(Handle<crate::Function>, u32),
    FunctionLocal(Handle<crate::Function>, Handle<crate::LocalVariable>),
    EntryPoint(EntryPointIndex),
}

/// This processor assigns names to all the things in a module
/// that may need identifiers in a textual backend.
pub struct Namer {
    /// Query keys of all names produced or reserved so far.
    used: FastHashSet<String>,
    keywords: FastHashSet<&'static str>,
    /// Lowercased keywords, for targets that reserve words regardless of case.
    keywords_case_insensitive: FastHashSet<String>,
    reserved_prefixes: Vec<&'static str>,
    /// When set, two names that differ only in case count as a collision.
    case_insensitive: bool,
}

impl Default for Namer {
    fn default() -> Self {
        Namer {
            used: FastHashSet::default(),
            keywords: FastHashSet::default(),
            keywords_case_insensitive: FastHashSet::default(),
            reserved_prefixes: Vec::new(),
            case_insensitive: false,
        }
    }
}

impl Namer {
    fn query_key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    /// Clean up and escape the given identifier.
    ///
    /// - an empty string produces a fixed placeholder;
    /// - reserved words (exactly, or case-insensitively where the target
    ///   requires it) and reserved prefixes gain a leading underscore;
    /// - characters the target languages would reject are dropped.
    fn sanitize(&self, string: &str) -> String {
        let mut base: String = string
            .chars()
            .filter(|&c| c.is_ascii_alphanumeric() || c == '_')
            .collect();
        if base.is_empty() {
            return String::from("_unnamed");
        }
        if base.as_bytes()[0].is_ascii_digit() {
            base.insert(0, '_');
        }
        let reserved = self.keywords.contains(base.as_str())
            || self
                .keywords_case_insensitive
                .contains(&base.to_lowercase())
            || self
                .reserved_prefixes
                .iter()
                .any(|prefix| base.starts_with(prefix));
        if reserved {
            base.insert(0, '_');
        }
        base
    }

    /// Mark a name as used, so that `call` never returns it.
    pub fn reserve(&mut self, name: &str) {
        let key = self.query_key(name);
        self.used.insert(key);
    }

    /// Return a name derived from `label_raw` that is unique within the
    /// module: the escaped base if it is free, otherwise `base_k` for the
    /// smallest `k >= 1` that avoids a collision.
    pub fn call(&mut self, label_raw: &str) -> String {
        let base = self.sanitize(label_raw);
        let key = self.query_key(&base);
        if !self.used.contains(&key) {
            self.used.insert(key);
            return base;
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            let key = self.query_key(&candidate);
            if !self.used.contains(&key) {
                self.used.insert(key);
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn call_or(&mut self, label: &Option<String>, fallback: &str) -> String {
        self.call(match *label {
            Some(ref name) => name,
            None => fallback,
        })
    }

    /// Enter a fresh module: forget all used names, install the target's
    /// reserved sets, and assign a name to every named entity of `module`.
    pub fn reset(
        &mut self,
        module: &crate::Module,
        reserved_keywords: &[&'static str],
        reserved_keywords_case_insensitive: &[&'static str],
        reserved_prefixes: &[&'static str],
        output: &mut FastHashMap<NameKey, String>,
    ) {
        self.used.clear();
        self.keywords.clear();
        self.keywords.extend(reserved_keywords.iter());
        self.keywords_case_insensitive.clear();
        self.keywords_case_insensitive.extend(
            reserved_keywords_case_insensitive
                .iter()
                .map(|s| s.to_lowercase()),
        );
        self.case_insensitive = !reserved_keywords_case_insensitive.is_empty();
        self.reserved_prefixes.clear();
        self.reserved_prefixes.extend(reserved_prefixes.iter());
        output.clear();

        // Entry points first: their names are part of the public interface,
        // so they get the first shot at keeping their original spelling.
        for (ep_index, ep) in module.entry_points.iter().enumerate() {
            let name = self.call(&ep.name);
            output.insert(NameKey::EntryPoint(ep_index as EntryPointIndex), name);
        }

        for (ty_handle, ty) in module.types.iter() {
            let ty_name = self.call_or(&ty.name, "type");
            output.insert(NameKey::Type(ty_handle), ty_name);
            if let crate::TypeInner::Struct { ref members, .. } = ty.inner {
                for (index, member) in members.iter().enumerate() {
                    let name = self.call_or(&member.name, "member");
                    output.insert(NameKey::StructMember(ty_handle, index as u32), name);
                }
            }
        }

        for (handle, constant) in module.constants.iter() {
            let name = self.call_or(&constant.name, "const");
            output.insert(NameKey::Constant(handle), name);
        }

        for (handle, var) in module.global_variables.iter() {
            let name = self.call_or(&var.name, "global");
            output.insert(NameKey::GlobalVariable(handle), name);
        }

        for (fun_handle, fun) in module.functions.iter() {
            if !module.is_entry_point_function(fun_handle) {
                let name = self.call_or(&fun.name, "function");
                output.insert(NameKey::Function(fun_handle), name);
            }
            for (index, arg) in fun.arguments.iter().enumerate() {
                let name = self.call_or(&arg.name, "param");
                output.insert(NameKey::FunctionArgument(fun_handle, index as u32), name);
            }
            for (local_handle, local) in fun.local_variables.iter() {
                let name = self.call_or(&local.name, "local");
                output.insert(NameKey::FunctionLocal(fun_handle, local_handle), name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Namer;

    #[test]
    fn collision_suffixes() {
        let mut namer = Namer::default();
        assert_eq!(namer.call("x"), "x");
        assert_eq!(namer.call("x"), "x_1");
        assert_eq!(namer.call("x"), "x_2");
    }

    #[test]
    fn empty_is_escaped() {
        let mut namer = Namer::default();
        assert_eq!(namer.call(""), "_unnamed");
        assert_eq!(namer.call(""), "_unnamed_1");
    }

    #[test]
    fn reserved_words_gain_underscore() {
        let mut namer = Namer::default();
        namer.keywords.insert("if");
        assert_eq!(namer.call("if"), "_if");
    }

    #[test]
    fn reserved_prefix() {
        let mut namer = Namer::default();
        namer.reserved_prefixes.push("gl_");
        assert_eq!(namer.call("gl_Position"), "_gl_Position");
    }

    #[test]
    fn case_insensitive_collision() {
        let mut namer = Namer::default();
        namer.case_insensitive = true;
        assert_eq!(namer.call("myVar"), "myVar");
        assert_eq!(namer.call("MYVAR"), "MYVAR_1");
    }

    #[test]
    fn reserve_blocks_name() {
        let mut namer = Namer::default();
        namer.reserve("_glaive_modf");
        assert_eq!(namer.call("_glaive_modf"), "_glaive_modf_1");
    }
}
