use stackflow_core::Prop;

/// `[{ Key: Name, Value: <name> }]`
pub fn name_tag(name: impl Into<String>) -> Prop {
    Prop::list([Prop::map([
        ("Key", Prop::from("Name")),
        ("Value", Prop::from(name.into())),
    ])])
}
