//! One entry point per refactoring kind.
//!
//! Every `create_*` method plans its refactoring right away against the
//! engine's snapshot and returns a [`RefactoringHandle`]. Overloads without
//! explicit search flags take them from [`RefactorSettings`].
//!
//! [`RefactorSettings`]: crate::config::RefactorSettings

use std::path::PathBuf;

use crate::container::{ContainerResolver, MoveDestination, Placement};
use crate::error::{RefactorError, Result};
use crate::refactor::operations::{
    ConvertToInstanceMethod, CookOptions, FactorySource, MakeClassStatic, MakeMethodStatic,
    MoveClassesOrPackages, MoveInner, MoveMembers, PlanContext, Rename,
    ReplaceConstructorWithFactory, StaticSettings, TurnRefsToSuper, TypeCook,
};
use crate::refactor::{Engine, RefactoringHandle};
use crate::scope::{DeclarationId, DeclarationKind, Visibility};

/// Creates refactorings against one [`Engine`].
pub struct RefactoringFactory<'e> {
    engine: &'e Engine,
}

impl<'e> RefactoringFactory<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Rename with the configured comment and non-source search defaults.
    pub fn create_rename(&self, element: DeclarationId, new_name: &str) -> Result<RefactoringHandle> {
        let settings = self.engine.settings();
        self.create_rename_with_options(
            element,
            new_name,
            settings.search_in_comments,
            settings.search_in_non_source_files,
        )
    }

    pub fn create_rename_with_options(
        &self,
        element: DeclarationId,
        new_name: &str,
        search_in_comments: bool,
        search_in_non_source_files: bool,
    ) -> Result<RefactoringHandle> {
        self.engine.plan(
            Rename::new(element, new_name)
                .search_in_comments(search_in_comments)
                .search_in_non_source_files(search_in_non_source_files),
        )
    }

    /// Move an inner class to the top level as `new_name`.
    ///
    /// With `pass_outer_class` the new class receives the outer instance
    /// through a constructor parameter, named `parameter_name` or after the
    /// outer class.
    pub fn create_move_inner(
        &self,
        inner: DeclarationId,
        new_name: &str,
        pass_outer_class: bool,
        parameter_name: Option<&str>,
    ) -> Result<RefactoringHandle> {
        let mut op = MoveInner::new(inner, new_name);
        if pass_outer_class {
            op.pass_outer_class = true;
            op.parameter_name = parameter_name.map(str::to_string);
        }
        self.engine.plan(op)
    }

    pub fn create_source_folder_preserving_move_destination(&self, package: &str) -> MoveDestination {
        MoveDestination::source_folder_preserving(package)
    }

    /// A destination under one source root, which must be configured or
    /// implied by an indexed file.
    pub fn create_source_root_move_destination(
        &self,
        package: &str,
        root: impl Into<PathBuf>,
    ) -> Result<MoveDestination> {
        let destination = MoveDestination::source_root(package, root);
        let resolver = ContainerResolver::for_index(self.engine.settings(), self.engine.index());
        if let Placement::SourceRoot(root) = &destination.placement {
            resolver.target_dir(&destination.placement, package, root, package)?;
        }
        Ok(destination)
    }

    pub fn create_move_classes_or_packages(
        &self,
        elements: Vec<DeclarationId>,
        destination: MoveDestination,
    ) -> Result<RefactoringHandle> {
        let settings = self.engine.settings();
        self.create_move_classes_or_packages_with_options(
            elements,
            destination,
            settings.search_in_comments,
            settings.search_in_non_source_files,
        )
    }

    pub fn create_move_classes_or_packages_with_options(
        &self,
        elements: Vec<DeclarationId>,
        destination: MoveDestination,
        search_in_comments: bool,
        search_in_non_source_files: bool,
    ) -> Result<RefactoringHandle> {
        self.engine.plan(
            MoveClassesOrPackages::new(elements, destination)
                .search_in_comments(search_in_comments)
                .search_in_non_source_files(search_in_non_source_files),
        )
    }

    /// Move static members into the class named `target_class`.
    ///
    /// `new_visibility` is a Java modifier (`public`, `protected`,
    /// `private`, `package`); `None` keeps each member's own.
    pub fn create_move_members(
        &self,
        elements: Vec<DeclarationId>,
        target_class: &str,
        new_visibility: Option<&str>,
    ) -> Result<RefactoringHandle> {
        self.create_move_members_with_enum_constants(elements, target_class, new_visibility, false)
    }

    pub fn create_move_members_with_enum_constants(
        &self,
        elements: Vec<DeclarationId>,
        target_class: &str,
        new_visibility: Option<&str>,
        make_enum_constants: bool,
    ) -> Result<RefactoringHandle> {
        let mut op = MoveMembers::new(elements, target_class).make_enum_constants(make_enum_constants);
        if let Some(visibility) = new_visibility {
            op = op.with_visibility(parse_visibility(visibility)?);
        }
        self.engine.plan(op)
    }

    /// Make an instance method static.
    ///
    /// With `class_parameter_name` the instance is passed under that name
    /// and each of `fields` becomes an extra parameter named by `names`.
    /// Without it the instance parameter takes `names[0]`, and only the
    /// listed `fields` may be read through it.
    pub fn create_make_method_static(
        &self,
        method: DeclarationId,
        replace_usages: bool,
        class_parameter_name: Option<&str>,
        fields: &[&str],
        names: &[&str],
    ) -> Result<RefactoringHandle> {
        let settings = static_settings(replace_usages, class_parameter_name, fields, names);
        self.engine.plan(MakeMethodStatic::new(method, settings))
    }

    pub fn create_make_class_static(
        &self,
        class: DeclarationId,
        replace_usages: bool,
        class_parameter_name: Option<&str>,
        fields: &[&str],
        names: &[&str],
    ) -> Result<RefactoringHandle> {
        let settings = static_settings(replace_usages, class_parameter_name, fields, names);
        self.engine.plan(MakeClassStatic::new(class, settings))
    }

    pub fn create_convert_to_instance_method(
        &self,
        method: DeclarationId,
        target_parameter: DeclarationId,
    ) -> Result<RefactoringHandle> {
        self.engine.plan(ConvertToInstanceMethod::new(method, target_parameter))
    }

    pub fn create_turn_refs_to_super(
        &self,
        class: DeclarationId,
        super_class: DeclarationId,
        replace_instance_of: bool,
    ) -> Result<RefactoringHandle> {
        self.engine
            .plan(TurnRefsToSuper::new(class, super_class).replace_instance_of(replace_instance_of))
    }

    /// Replace calls to `constructor` with a factory method placed in the
    /// class named `target_class`.
    pub fn create_replace_constructor_with_factory(
        &self,
        constructor: DeclarationId,
        target_class: &str,
        factory_name: &str,
    ) -> Result<RefactoringHandle> {
        let decl = self.engine.index().get(constructor)?;
        if decl.kind != DeclarationKind::Constructor {
            return Err(RefactorError::UnsupportedElement {
                operation: "Replace Constructor With Factory",
                message: format!("{} is not a constructor", self.engine.index().describe(constructor)),
            });
        }
        let target = self.resolve_class(target_class)?;
        self.engine.plan(ReplaceConstructorWithFactory::new(
            FactorySource::Constructor(constructor),
            target,
            factory_name,
        ))
    }

    /// The variant for classes relying on their implicit default
    /// constructor.
    pub fn create_replace_constructor_with_factory_for_class(
        &self,
        class: DeclarationId,
        target_class: &str,
        factory_name: &str,
    ) -> Result<RefactoringHandle> {
        let target = self.resolve_class(target_class)?;
        self.engine.plan(ReplaceConstructorWithFactory::new(
            FactorySource::Class(class),
            target,
            factory_name,
        ))
    }

    pub fn create_type_cook(
        &self,
        elements: Vec<DeclarationId>,
        options: CookOptions,
    ) -> Result<RefactoringHandle> {
        self.engine.plan(TypeCook::new(elements, options))
    }

    fn resolve_class(&self, qualified_name: &str) -> Result<DeclarationId> {
        let engine = self.engine;
        PlanContext::new(engine.index(), engine.storage(), engine.settings()).resolve_class(qualified_name)
    }
}

fn parse_visibility(name: &str) -> Result<Visibility> {
    Visibility::parse(name)
        .ok_or_else(|| RefactorError::InvalidConfig(format!("unknown visibility '{}'", name)))
}

fn static_settings(
    replace_usages: bool,
    class_parameter_name: Option<&str>,
    fields: &[&str],
    names: &[&str],
) -> StaticSettings {
    let mut settings = StaticSettings::new(replace_usages);
    if let Some(name) = class_parameter_name {
        settings = settings.with_class_parameter(name);
    }
    settings.fields = fields.iter().map(|f| f.to_string()).collect();
    settings.names = names.iter().map(|n| n.to_string()).collect();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefactorSettings;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    const SHOP: &str = "package shop;

public class Order {
    private int count;

    public Order(int count) {
        this.count = count;
    }

    int size() {
        return count;
    }
}
";

    fn engine() -> Engine {
        let storage = MemoryStorage::new()
            .with_file("src/main/java/shop/Order.java", SHOP)
            .with_file("src/main/java/shop/Orders.java", "package shop;\n\nclass Orders {\n}\n");
        Engine::new(Arc::new(storage), RefactorSettings::default()).unwrap()
    }

    #[test]
    fn test_source_root_destination_must_be_known() {
        let engine = engine();
        let factory = engine.factory();
        assert!(factory
            .create_source_root_move_destination("shop.api", "src/main/java")
            .is_ok());
        let err = factory
            .create_source_root_move_destination("shop.api", "lib/java")
            .unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
    }

    #[test]
    fn test_invalid_visibility() {
        let engine = engine();
        let size = engine.index().resolve("shop.Order#size").unwrap();
        let err = engine
            .factory()
            .create_move_members(vec![size], "shop.Orders", Some("friendly"))
            .unwrap_err();
        assert!(matches!(err, RefactorError::InvalidConfig(_)));
    }

    #[test]
    fn test_factory_target_must_resolve() {
        let engine = engine();
        let constructor = engine.index().resolve("shop.Order#Order").unwrap();
        let err = engine
            .factory()
            .create_replace_constructor_with_factory(constructor, "shop.Missing", "of")
            .unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));

        let handle = engine
            .factory()
            .create_replace_constructor_with_factory(constructor, "shop.Order", "of")
            .unwrap();
        assert!(!handle.plan().is_empty());
    }

    #[test]
    fn test_make_method_static_with_fields() {
        let engine = engine();
        let size = engine.index().resolve("shop.Order#size").unwrap();
        let handle = engine
            .factory()
            .create_make_method_static(size, true, None, &["count"], &["n"])
            .unwrap();
        let diff = handle.diff(false).unwrap();
        assert!(diff.contains("+    static int size(Order n) {"));
        assert!(diff.contains("+        return n.count;"));
    }
}
