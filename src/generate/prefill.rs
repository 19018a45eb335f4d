//! Prefill kernel: 16x16 output tiles with cooperative staging of both
//! operands, tuned for long sequences on low-end integrated GPUs.
//!
//! Only reachable when block size is 32, A and B both pack 4-wide, there are
//! no zero-points and the batch is 1, so the source varies with the element
//! type alone. `local_idx / 16` is the wave index and `local_idx % 16` the
//! lane, which keeps one wave's loads adjacent in memory.

use crate::dtype::DType;
use crate::variant::PrefillParams;
use crate::wgsl::{Expr, Func, KernelBuilder, Stmt, Ty};

fn ident(name: &str) -> Expr {
    Expr::ident(name)
}

fn param(field: &str) -> Expr {
    ident("params").member(field)
}

pub fn prefill_source(p: &PrefillParams) -> String {
    let elem = Ty::Scalar(p.dtype);
    let vec4 = Ty::Vec(4, p.dtype);

    let mut kb = KernelBuilder::new();
    if p.dtype == DType::F16 {
        kb.enable_f16();
    }
    kb.workgroup_size([256, 1, 1]);
    kb.define_struct(
        "Params",
        vec![
            ("m".into(), Ty::U32),
            ("n".into(), Ty::U32),
            ("k".into(), Ty::U32),
            ("k4".into(), Ty::U32),
            ("k8".into(), Ty::U32),
        ],
    );
    let in_a = kb.bind_storage("in_a", Ty::runtime_array(vec4.clone()), true);
    let in_b = kb.bind_storage("in_b", Ty::runtime_array(Ty::U32), true);
    let scales = kb.bind_storage("scales", Ty::runtime_array(elem.clone()), true);
    let out = kb.bind_storage("output", Ty::runtime_array(elem.clone()), false);
    kb.bind_uniform("params", Ty::Named("Params".into()));

    let tile_size = kb.constant("TILE_SIZE", Expr::u32(16));
    // two blocks of 32 per cycle; 16 vec4 loads cover them, one per lane
    kb.constant("BLOCKS_PER_CYCLE", Expr::u32(2));
    let inner_items = kb.constant("INNER_DIMENSION_ITEMS_PER_CYCLE", Expr::u32(16));
    let vec_qblock = kb.constant("VECTORIZED_QUANTIZATION_BLOCK_SIZE", Expr::u32(8));

    let tile_a = kb.workgroup_array(
        "tile_a",
        Ty::array(Ty::array(vec4.clone(), 16), 16),
    );
    let tile_b = kb.workgroup_array(
        "tile_b",
        Ty::array(Ty::array(vec4.clone(), 16), 16),
    );
    let tile_o = kb.workgroup_array(
        "tile_o",
        Ty::array(Ty::array(elem.clone(), 16), 16),
    );

    kb.function(
        Func::new("load_a")
            .param("slot", Ty::U32)
            .param("a_global", Ty::U32)
            .param("step_idx", Ty::U32)
            .param("parallel_id", Ty::U32)
            .body(vec![
                Stmt::if_(
                    ident("a_global").ge(param("m")),
                    vec![Stmt::Return(None)],
                ),
                Stmt::assign(
                    tile_a.at2(ident("slot"), ident("parallel_id")),
                    in_a.clone().index(
                        ident("a_global") * param("k4")
                            + ident("step_idx") * inner_items.clone()
                            + ident("parallel_id"),
                    ),
                ),
            ]),
    );

    // one scale per 32 values; each step consumes 64, so two scales per step
    kb.function(
        Func::new("get_b_scale")
            .param("b_global", Ty::U32)
            .param("vec_step_idx", Ty::U32)
            .param("scale_idx", Ty::U32)
            .returns(elem.clone())
            .body(vec![
                Stmt::let_("scale_offset", ident("vec_step_idx") * Expr::u32(2)),
                Stmt::let_(
                    "idx",
                    ident("b_global") * (param("k") / Expr::u32(32)) + ident("scale_offset"),
                ),
                Stmt::Return(Some(
                    scales.clone().index(ident("idx") + ident("scale_idx")),
                )),
            ]),
    );

    // even lanes each unpack one weight word into two staged vec4s
    let mut dequant_writes = Vec::new();
    let fields = ["x", "y", "z", "w"];
    for half in 0..2u32 {
        let slot_col = if half == 0 {
            ident("idx")
        } else {
            ident("idx") + Expr::u32(1)
        };
        for i in 0..2u32 {
            let byte = half * 2 + i;
            for (j, side) in ["b_value_lower", "b_value_upper"].iter().enumerate() {
                let field = fields[(i * 2) as usize + j];
                dequant_writes.push(Stmt::assign(
                    tile_b
                        .at2(ident("slot"), slot_col.clone())
                        .member(field),
                    (Expr::cast(&elem, ident(side).index(Expr::u32(byte))) - Expr::float(8.0))
                        * ident("scale"),
                ));
            }
        }
    }

    kb.function(
        Func::new("load_b")
            .param("slot", Ty::U32)
            .param("b_global", Ty::U32)
            .param("vec_step_idx", Ty::U32)
            .param("parallel_id", Ty::U32)
            .body({
                let mut body = vec![
                    Stmt::if_(
                        ident("b_global").ge(param("n")),
                        vec![Stmt::Return(None)],
                    ),
                    Stmt::let_(
                        "scale",
                        Expr::call(
                            "get_b_scale",
                            vec![
                                ident("b_global"),
                                ident("vec_step_idx"),
                                ident("parallel_id") / vec_qblock.clone(),
                            ],
                        ),
                    ),
                    Stmt::let_("idx", ident("parallel_id")),
                ];
                let mut even_branch = vec![
                    // each step advances 64 weights = 8 packed words
                    Stmt::let_(
                        "weight_offset",
                        ident("vec_step_idx") * Expr::u32(8) + ident("idx") / Expr::u32(2),
                    ),
                    Stmt::let_(
                        "b_value",
                        in_b.clone()
                            .index(ident("b_global") * param("k8") + ident("weight_offset")),
                    ),
                    Stmt::let_(
                        "b_value_lower",
                        Expr::call(
                            "unpack4xU8",
                            vec![ident("b_value").bitand(Expr::hex(0x0F0F0F0F))],
                        ),
                    ),
                    Stmt::let_(
                        "b_value_upper",
                        Expr::call(
                            "unpack4xU8",
                            vec![ident("b_value")
                                .shr(Expr::u32(4))
                                .bitand(Expr::hex(0x0F0F0F0F))],
                        ),
                    ),
                ];
                even_branch.append(&mut dequant_writes);
                body.push(Stmt::if_(
                    ident("idx").rem(Expr::u32(2)).eq(Expr::u32(0)),
                    even_branch,
                ));
                body
            }),
    );

    kb.function(
        Func::new("compute_dot_product")
            .param("slot_a", Ty::U32)
            .param("slot_b", Ty::U32)
            .returns(elem.clone())
            .body(vec![
                Stmt::var_init("sum", Expr::cast(&elem, Expr::LitI32(0))),
                Stmt::for_(
                    "idx",
                    Expr::u32(0),
                    inner_items.clone(),
                    vec![Stmt::add_assign(
                        ident("sum"),
                        Expr::call(
                            "dot",
                            vec![
                                tile_a.at2(ident("slot_a"), ident("idx")),
                                tile_b.at2(ident("slot_b"), ident("idx")),
                            ],
                        ),
                    )],
                ),
                Stmt::Return(Some(ident("sum"))),
            ]),
    );

    kb.stmt(Stmt::let_("idx", ident("local_idx") / tile_size.clone()));
    kb.stmt(Stmt::let_("idy", ident("local_idx").rem(tile_size.clone())));
    kb.stmt(Stmt::let_(
        "a_global_base",
        ident("workgroup_id").member("x") * tile_size.clone(),
    ));
    kb.stmt(Stmt::let_(
        "b_global_base",
        ident("workgroup_id").member("y") * tile_size.clone(),
    ));
    // 64 values of K per cycle
    kb.stmt(Stmt::let_("step_count", param("k") / Expr::u32(64)));
    kb.stmt(Stmt::for_(
        "vec_step",
        Expr::u32(0),
        ident("step_count"),
        vec![
            Stmt::Barrier,
            Stmt::Expr(Expr::call(
                "load_a",
                vec![
                    ident("idx"),
                    ident("a_global_base") + ident("idx"),
                    ident("vec_step"),
                    ident("idy"),
                ],
            )),
            Stmt::Expr(Expr::call(
                "load_b",
                vec![
                    ident("idx"),
                    ident("b_global_base") + ident("idx"),
                    ident("vec_step"),
                    ident("idy"),
                ],
            )),
            Stmt::Barrier,
            Stmt::let_(
                "result",
                Expr::call("compute_dot_product", vec![ident("idx"), ident("idy")]),
            ),
            Stmt::add_assign(tile_o.at2(ident("idx"), ident("idy")), ident("result")),
        ],
    ));
    kb.stmt(Stmt::Barrier);
    kb.stmt(Stmt::if_(
        (ident("a_global_base") + ident("idx"))
            .lt(param("m"))
            .and((ident("b_global_base") + ident("idy")).lt(param("n"))),
        vec![Stmt::assign(
            out.clone().index(
                (ident("a_global_base") + ident("idx")) * param("n")
                    + ident("b_global_base")
                    + ident("idy"),
            ),
            tile_o.at2(ident("idx"), ident("idy")),
        )],
    ));

    kb.render()
}
